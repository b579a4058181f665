use mimicdb::update::parse_update_json;
use mimicdb::{Bson, Collection, DbError, UpdateOptions, doc};

fn one(doc: bson::Document) -> Collection {
    let mut col = Collection::new("u");
    col.insert(doc).unwrap();
    col
}

fn stored(col: &Collection) -> bson::Document {
    col.find_one(doc! {}).unwrap().unwrap()
}

#[test]
fn set_then_read_back() {
    let mut col = Collection::new("people");
    col.insert(doc! {"name": "bob"}).unwrap();
    let report = col.update(doc! {"name": "bob"}, &doc! {"$set": {"hat": "red"}}, UpdateOptions::default()).unwrap();
    assert_eq!((report.matched, report.modified), (1, 1));
    let bob = col.find_one(doc! {"name": "bob"}).unwrap().unwrap();
    assert_eq!(bob.get_str("hat").unwrap(), "red");
}

#[test]
fn numeric_modifiers() {
    let mut col = one(doc! {"_id": 1, "n": 1, "f": 1.5, "big": i32::MAX});
    col.update_one(doc! {}, &doc! {"$inc": {"n": 2, "f": 1, "new": 5, "big": 1}}, false).unwrap();
    let widened = i64::from(i32::MAX) + 1;
    assert_eq!(stored(&col), doc! {"_id": 1, "n": 3, "f": 2.5, "big": widened, "new": 5});
    col.update_one(doc! {}, &doc! {"$mul": {"n": 2, "absent": 3}}, false).unwrap();
    let d = stored(&col);
    assert_eq!(d.get_i32("n").unwrap(), 6);
    assert_eq!(d.get_i32("absent").unwrap(), 0);
    col.update_one(doc! {}, &doc! {"$min": {"n": 4}, "$max": {"f": 1.0}}, false).unwrap();
    let d = stored(&col);
    assert_eq!(d.get_i32("n").unwrap(), 4);
    assert_eq!(d.get_f64("f").unwrap(), 2.5);
}

#[test]
fn inc_on_a_string_fails_and_leaves_document_untouched() {
    let mut col = one(doc! {"_id": 1, "s": "x", "n": 1});
    let err = col.update_one(doc! {}, &doc! {"$inc": {"n": 1, "s": 1}}, false).unwrap_err();
    assert!(matches!(err, DbError::OperationFailure(_)));
    assert_eq!(stored(&col), doc! {"_id": 1, "s": "x", "n": 1});
}

#[test]
fn array_modifiers() {
    let mut col = one(doc! {"_id": 1, "xs": [1, 2], "ys": [{"k": 1}, {"k": 2}, {"k": 3}]});
    col.update_one(doc! {}, &doc! {"$push": {"xs": {"$each": [3, 4, 5], "$slice": -4}}}, false).unwrap();
    col.update_one(doc! {}, &doc! {"$addToSet": {"xs": {"$each": [2, 9]}}}, false).unwrap();
    assert_eq!(stored(&col).get_array("xs").unwrap(), &vec![Bson::Int32(2), 3.into(), 4.into(), 5.into(), 9.into()]);
    col.update_one(doc! {}, &doc! {"$pull": {"ys": {"k": {"$gte": 2}}}, "$pullAll": {"xs": [3, 4]}}, false).unwrap();
    col.update_one(doc! {}, &doc! {"$pop": {"xs": -1}}, false).unwrap();
    assert_eq!(stored(&col), doc! {"_id": 1, "xs": [5, 9], "ys": [{"k": 1}]});
    let err = col.update_one(doc! {}, &doc! {"$push": {"_id": 1}}, false).unwrap_err();
    assert!(matches!(err, DbError::OperationFailure(_)));
}

#[test]
fn push_at_position() {
    let mut col = one(doc! {"_id": 1, "xs": [1, 4]});
    col.update_one(doc! {}, &doc! {"$push": {"xs": {"$each": [2, 3], "$position": 1}}}, false).unwrap();
    assert_eq!(stored(&col).get_array("xs").unwrap().len(), 4);
    assert_eq!(stored(&col), doc! {"_id": 1, "xs": [1, 2, 3, 4]});
}

#[test]
fn unset_and_rename() {
    let mut col = one(doc! {"_id": 1, "a": {"b": 1, "c": 2}, "xs": [1, 2]});
    col.update_one(doc! {}, &doc! {"$unset": {"a.b": "", "xs.0": 1}, "$rename": {"a.c": "z"}}, false).unwrap();
    assert_eq!(stored(&col), doc! {"_id": 1, "a": {}, "xs": [null, 2], "z": 2});
}

#[test]
fn positional_operator_targets_matched_element() {
    let mut col = one(doc! {"_id": 1, "grades": [80, 85, 90], "items": [{"sku": "a", "qty": 1}, {"sku": "b", "qty": 1}]});
    col.update_one(doc! {"grades": 85}, &doc! {"$set": {"grades.$": 86}}, false).unwrap();
    col.update_one(doc! {"items.sku": "b"}, &doc! {"$inc": {"items.$.qty": 4}}, false).unwrap();
    assert_eq!(
        stored(&col),
        doc! {"_id": 1, "grades": [80, 86, 90], "items": [{"sku": "a", "qty": 1}, {"sku": "b", "qty": 5}]}
    );
    let err = col.update_one(doc! {}, &doc! {"$set": {"grades.$": 1}}, false).unwrap_err();
    assert!(matches!(err, DbError::OperationFailure(_)));
}

#[test]
fn replacement_and_id_rules() {
    let mut col = one(doc! {"_id": 1, "a": 1});
    col.update_one(doc! {"_id": 1}, &doc! {"b": 2}, false).unwrap();
    assert_eq!(stored(&col), doc! {"_id": 1, "b": 2});
    assert!(col.update_one(doc! {}, &doc! {"_id": 2, "b": 3}, false).is_err());
    assert!(col.update_one(doc! {}, &doc! {"$set": {"_id": 2}}, false).is_err());
    col.update_one(doc! {}, &doc! {"$set": {"_id": 1, "c": 1}}, false).unwrap();
    assert!(matches!(
        col.update_one(doc! {}, &doc! {"b": 1, "$set": {"c": 1}}, false),
        Err(DbError::Validation(_))
    ));
    assert!(matches!(
        col.update(doc! {}, &doc! {"b": 1}, UpdateOptions { upsert: false, multi: true }),
        Err(DbError::Validation(_))
    ));
}

#[test]
fn unknown_modifier_is_rejected() {
    let mut col = one(doc! {"a": 1});
    assert!(matches!(col.update_one(doc! {}, &doc! {"$frob": {"a": 1}}, false), Err(DbError::Validation(_))));
}

#[test]
fn json_updates() {
    let spec = parse_update_json(r#"{"$set": {"a.b": 1}, "$inc": {"n": 2}}"#).unwrap();
    assert!(!spec.is_replacement());
    assert!(parse_update_json(r#"{"$set": 1}"#).is_err());
}

#[test]
fn multi_updates_every_match() {
    let mut col = Collection::new("m");
    col.insert_many((0..5).map(|i| {
        let even = i % 2 == 0;
        doc! {"i": i, "even": even}
    }))
    .unwrap();
    let report = col.update_many(doc! {"even": true}, &doc! {"$set": {"tag": "e"}}, false).unwrap();
    assert_eq!((report.matched, report.modified), (3, 3));
    let report = col.update_many(doc! {"even": true}, &doc! {"$set": {"tag": "e"}}, false).unwrap();
    assert_eq!((report.matched, report.modified), (3, 0));
    assert_eq!(col.count_documents(doc! {"tag": "e"}).unwrap(), 3);
}
