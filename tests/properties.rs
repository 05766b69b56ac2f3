use bytes::Bytes;
use proptest::collection::vec;
use proptest::prelude::*;
use shoal::{Store, StreamId};

fn member(bytes: Vec<u8>) -> Bytes {
    Bytes::from(bytes)
}

proptest! {
    #[test]
    fn zranks_are_complementary(
        entries in vec((any::<i32>(), vec(any::<u8>(), 1..8)), 1..32),
    ) {
        let store = Store::default();
        let db = store.db(0).unwrap();
        let key = Bytes::from_static(b"z");

        let entries: Vec<(f64, Bytes)> = entries
            .into_iter()
            .map(|(score, m)| (f64::from(score), member(m)))
            .collect();
        db.zadd(&key, entries.clone()).unwrap();

        let card = db.zcard(b"z").unwrap();
        for (_, m) in &entries {
            let rank = db.zrank(b"z", m).unwrap().unwrap();
            let revrank = db.zrevrank(b"z", m).unwrap().unwrap();
            prop_assert_eq!(rank + revrank, card - 1);
        }
    }

    #[test]
    fn zrange_is_sorted(
        entries in vec((any::<i32>(), vec(any::<u8>(), 1..8)), 1..32),
    ) {
        let store = Store::default();
        let db = store.db(0).unwrap();
        let key = Bytes::from_static(b"z");
        let entries: Vec<(f64, Bytes)> = entries
            .into_iter()
            .map(|(score, m)| (f64::from(score), member(m)))
            .collect();
        db.zadd(&key, entries).unwrap();

        let range = db.zrange(b"z", 0, -1).unwrap();
        for pair in range.windows(2) {
            let ordered = pair[0].1 < pair[1].1
                || (pair[0].1 == pair[1].1 && pair[0].0 < pair[1].0);
            prop_assert!(ordered, "range out of order: {pair:?}");
        }
    }

    #[test]
    fn lpush_then_lrange_reverses(values in vec(vec(any::<u8>(), 0..8), 1..16)) {
        let store = Store::default();
        let db = store.db(0).unwrap();
        let key = Bytes::from_static(b"l");

        let values: Vec<Bytes> = values.into_iter().map(member).collect();
        db.lpush(&key, values.clone()).unwrap();

        let mut expected = values;
        expected.reverse();
        prop_assert_eq!(db.lrange(b"l", 0, -1).unwrap(), expected);
    }

    #[test]
    fn setbit_getbit_round_trip(offsets in vec(0i64..4096, 1..32)) {
        let store = Store::default();
        let db = store.db(0).unwrap();
        let key = Bytes::from_static(b"bits");

        for &offset in &offsets {
            db.setbit(&key, offset, 1).unwrap();
        }
        for &offset in &offsets {
            prop_assert_eq!(db.getbit(b"bits", offset).unwrap(), 1);
        }

        let distinct: std::collections::HashSet<i64> = offsets.iter().copied().collect();
        prop_assert_eq!(
            db.bitcount(b"bits", None).unwrap(),
            i64::try_from(distinct.len()).unwrap()
        );
    }

    #[test]
    fn hset_returns_true_iff_field_was_absent(
        fields in vec(vec(any::<u8>(), 1..6), 1..24),
    ) {
        let store = Store::default();
        let db = store.db(0).unwrap();
        let key = Bytes::from_static(b"h");

        for field in fields {
            let field = member(field);
            let existed = db.hexists(b"h", &field).unwrap();
            let created = db.hset(&key, field, Bytes::from_static(b"v")).unwrap();
            prop_assert_eq!(created, !existed);
        }
    }

    #[test]
    fn stream_ids_strictly_increase(clocks in vec(any::<u32>(), 1..64)) {
        let store = Store::default();
        let db = store.db(0).unwrap();
        let key = Bytes::from_static(b"s");

        // Explicit ids from an arbitrary (even rewinding) clock must
        // still come out strictly increasing via auto-generation.
        let mut last = StreamId::MIN;
        for _clock in clocks {
            let fields = [(Bytes::from_static(b"f"), Bytes::from_static(b"v"))]
                .into_iter()
                .collect();
            let id = db.xadd(&key, None, fields, None).unwrap();
            prop_assert!(id > last, "{id:?} not after {last:?}");
            last = id;
        }
    }
}
