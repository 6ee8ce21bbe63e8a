use engine::Tick;
use proptest::prelude::*;

proptest! {
    #[test]
    fn prop_seq_diff_of_advance(start in any::<u16>(), n in 0u16..=32767) {
        let a = Tick::new(start);
        let b = a.advance(n);
        prop_assert_eq!(b.seq_diff(a), n as i16);
    }

    #[test]
    fn prop_seq_diff_self_is_zero(raw in any::<u16>()) {
        let tick = Tick::new(raw);
        prop_assert_eq!(tick.seq_diff(tick), 0);
        prop_assert!(!tick.is_newer_than(tick));
    }

    #[test]
    fn prop_newer_is_antisymmetric(a in any::<u16>(), b in any::<u16>()) {
        let a = Tick::new(a);
        let b = Tick::new(b);
        prop_assert!(!(a.is_newer_than(b) && b.is_newer_than(a)));
    }

    #[test]
    fn prop_seq_diff_antisymmetric_off_extreme(start in any::<u16>(), n in 1u16..=32767) {
        let a = Tick::new(start);
        let b = a.advance(n);
        prop_assert_eq!(b.seq_diff(a), -a.seq_diff(b));
        prop_assert!(b.is_newer_than(a));
        prop_assert!(!a.is_newer_than(b));
    }

    #[test]
    fn prop_advance_composes(start in any::<u16>(), n in 0u16..=16000, m in 0u16..=16000) {
        let tick = Tick::new(start);
        prop_assert_eq!(tick.advance(n).advance(m), tick.advance(n + m));
    }
}
