use nupak_util::scratch::with_scratch;

#[test]
fn test_buffers_are_cleared_between_rents() {
    with_scratch(|s| {
        s.queue.push_back(1);
        s.seen.insert(2);
        s.counts.insert(3, 4);
    });
    with_scratch(|s| {
        assert!(s.queue.is_empty());
        assert!(s.seen.is_empty());
        assert!(s.counts.is_empty());
    });
}

#[test]
fn test_nested_rent_does_not_alias() {
    with_scratch(|outer| {
        outer.queue.push_back(10);
        with_scratch(|inner| {
            assert!(inner.queue.is_empty());
            inner.queue.push_back(20);
        });
        // the inner rent worked on its own allocation
        assert_eq!(outer.queue.len(), 1);
        assert_eq!(outer.queue.front(), Some(&10));
    });
}

#[test]
fn test_returns_a_value() {
    let sum = with_scratch(|s| {
        s.counts.insert(1, 40);
        s.counts.insert(2, 2);
        s.counts.values().sum::<i64>()
    });
    assert_eq!(sum, 42);
}
