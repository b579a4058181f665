use proptest::prelude::*;
use mimicdb::query::{SortSpec, eval_filter, Filter};
use mimicdb::update::UpdateSpec;
use mimicdb::{Bson, Collection, Document, FindOptions, doc};

fn small_doc() -> impl Strategy<Value = Document> {
    (any::<Option<i32>>(), proptest::collection::vec(0i32..5, 0..4)).prop_map(|(a, xs)| {
        let mut d = doc! {"xs": xs};
        if let Some(a) = a {
            d.insert("a", a);
        }
        d
    })
}

fn predicate() -> impl Strategy<Value = Document> {
    prop_oneof![
        (any::<i32>()).prop_map(|v| doc! {"a": {"$gt": v}}),
        (0i32..5).prop_map(|v| doc! {"xs": v}),
        any::<bool>().prop_map(|b| doc! {"a": {"$exists": b}}),
        (0i32..5).prop_map(|v| doc! {"xs": {"$ne": v}}),
    ]
}

fn a_condition() -> impl Strategy<Value = Bson> {
    prop_oneof![
        any::<i32>().prop_map(Bson::Int32),
        any::<i32>().prop_map(|v| Bson::Document(doc! {"$lt": v})),
        any::<bool>().prop_map(|b| Bson::Document(doc! {"$exists": b})),
    ]
}

fn xs_condition() -> impl Strategy<Value = Bson> {
    prop_oneof![
        (0i32..5).prop_map(Bson::Int32),
        (0i32..5).prop_map(|v| Bson::Document(doc! {"$nin": [v]})),
        (0i32..5).prop_map(|v| Bson::Document(doc! {"$gte": v})),
    ]
}

proptest! {
    #[test]
    fn and_is_commutative(d in small_doc(), p in predicate(), q in predicate()) {
        let pq = Filter::parse(&doc! {"$and": [p.clone(), q.clone()]}).unwrap();
        let qp = Filter::parse(&doc! {"$and": [q, p]}).unwrap();
        prop_assert_eq!(eval_filter(&d, &pq), eval_filter(&d, &qp));
    }

    #[test]
    fn or_ignores_clause_order(d in small_doc(), p in predicate(), q in predicate()) {
        let pq = Filter::parse(&doc! {"$or": [p.clone(), q.clone()]}).unwrap();
        let qp = Filter::parse(&doc! {"$or": [q, p]}).unwrap();
        prop_assert_eq!(eval_filter(&d, &pq), eval_filter(&d, &qp));
    }

    #[test]
    fn top_level_key_order_is_irrelevant(d in small_doc(), a in a_condition(), x in xs_condition()) {
        let mut ax = Document::new();
        ax.insert("a", a.clone());
        ax.insert("xs", x.clone());
        let mut xa = Document::new();
        xa.insert("xs", x);
        xa.insert("a", a);
        let (ax, xa) = (Filter::parse(&ax).unwrap(), Filter::parse(&xa).unwrap());
        prop_assert_eq!(eval_filter(&d, &ax), eval_filter(&d, &xa));
    }

    #[test]
    fn inserted_document_reads_back_with_id_first(d in small_doc()) {
        let mut col = Collection::new("p");
        let id = col.insert(d.clone()).unwrap();
        let mut expected = doc! {"_id": id.clone()};
        for (k, v) in d {
            expected.insert(k, v);
        }
        prop_assert_eq!(col.find_one(&id).unwrap(), Some(expected));
    }

    #[test]
    fn exists_per_element(xs in proptest::collection::vec(proptest::option::of(0i32..3), 0..5)) {
        let items: Vec<Bson> = xs
            .iter()
            .map(|x| match x {
                Some(v) => Bson::Document(doc! {"b": *v}),
                None => Bson::Document(doc! {}),
            })
            .collect();
        let d = doc! {"a": items};
        let f = Filter::parse(&doc! {"a.b": {"$exists": true}}).unwrap();
        prop_assert_eq!(eval_filter(&d, &f), xs.iter().any(Option::is_some));
    }

    #[test]
    fn set_is_idempotent(d in small_doc(), v in any::<i32>()) {
        let mut col = Collection::new("p");
        col.insert(d).unwrap();
        let spec = doc! {"$set": {"a": v, "n.m": v}};
        col.update_one(doc! {}, &spec, false).unwrap();
        let once = col.find_one(doc! {}).unwrap();
        let report = col.update_one(doc! {}, &spec, false).unwrap();
        prop_assert_eq!(report.modified, 0);
        prop_assert_eq!(once, col.find_one(doc! {}).unwrap());
        prop_assert!(UpdateSpec::parse(&spec).is_ok());
    }

    #[test]
    fn push_then_pull_restores(xs in proptest::collection::vec(0i32..5, 0..6), v in 10i32..20) {
        let mut col = Collection::new("p");
        col.insert(doc! {"_id": 1, "xs": xs.clone()}).unwrap();
        col.update_one(doc! {}, &doc! {"$push": {"xs": v}}, false).unwrap();
        col.update_one(doc! {}, &doc! {"$pull": {"xs": v}}, false).unwrap();
        prop_assert_eq!(col.find_one(doc! {}).unwrap(), Some(doc! {"_id": 1, "xs": xs}));
    }

    #[test]
    fn sort_is_stable(keys in proptest::collection::vec(0i32..4, 0..30)) {
        let mut col = Collection::new("p");
        for (i, k) in keys.iter().enumerate() {
            let i = i32::try_from(i).unwrap();
            col.insert(doc! {"_id": i, "k": *k}).unwrap();
        }
        let opts = FindOptions { sort: Some(vec![SortSpec::asc("k")]), ..FindOptions::default() };
        let out = col.find(doc! {}, opts).unwrap().to_vec();
        for w in out.windows(2) {
            let (k0, k1) = (w[0].get_i32("k").unwrap(), w[1].get_i32("k").unwrap());
            prop_assert!(k0 < k1 || (k0 == k1 && w[0].get_i32("_id").unwrap() < w[1].get_i32("_id").unwrap()));
        }
    }
}
