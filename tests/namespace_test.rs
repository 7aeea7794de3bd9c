//! Node id addressing: composition, parsing and classification.

use rand::Rng;
use rand::distributions::Alphanumeric;
use rand::seq::SliceRandom;
use sqlbridge::namespace::{
    FolderKind, NodeKind, NodePath, ROOT_ID, Segment, classify, compose, parse,
};

fn random_name(rng: &mut impl Rng) -> String {
    let len = rng.gen_range(1..=24);
    let mut name: String = rng
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect();
    // Names may carry anything except the two separators
    if rng.gen_bool(0.3) {
        name.push_str(["_", "-", " ", "é", "日本"].choose(rng).unwrap_or(&"_"));
    }
    name
}

fn random_segment(rng: &mut impl Rng) -> Segment {
    match rng.gen_range(0..7) {
        0 => Segment::Database(random_name(rng)),
        1 => Segment::Schema(random_name(rng)),
        2 => Segment::Folder(*FolderKind::ALL.choose(rng).unwrap_or(&FolderKind::Tables)),
        3 => Segment::Table(random_name(rng)),
        4 => Segment::View(random_name(rng)),
        5 => Segment::Function(random_name(rng)),
        _ => Segment::Column(random_name(rng)),
    }
}

#[test]
fn test_parse_compose_round_trip_random() {
    let mut rng = rand::thread_rng();
    for _ in 0..500 {
        let len = rng.gen_range(1..=6);
        let segments: Vec<Segment> = (0..len).map(|_| random_segment(&mut rng)).collect();
        let id = compose(&segments).unwrap();
        assert_eq!(parse(id.as_str()).unwrap(), segments, "id: {}", id);
        assert_eq!(classify(id.as_str()), segments[len - 1].kind());
    }
}

#[test]
fn test_classify_uses_last_segment() {
    assert_eq!(classify("db:a"), NodeKind::Database);
    assert_eq!(classify("db:a.schema:b"), NodeKind::Schema);
    assert_eq!(classify("db:a.schema:b.folder:tables"), NodeKind::Folder);
    assert_eq!(
        classify("db:a.schema:b.folder:tables.table:c"),
        NodeKind::Table
    );
    assert_eq!(classify(ROOT_ID), NodeKind::Root);
}

#[test]
fn test_bare_name_is_legacy_table() {
    assert_eq!(parse("orders").unwrap(), vec![Segment::Table("orders".into())]);
    let path = NodePath::resolve("orders", Some("public")).unwrap();
    assert_eq!(path.schema.as_deref(), Some("public"));
    assert_eq!(path.object_name(), Some("orders"));
}

#[test]
fn test_compose_rejects_separators_in_values() {
    for bad in ["a.b", "a:b", ""] {
        let result = compose(&[Segment::Table(bad.to_string())]);
        assert!(result.is_err(), "accepted {:?}", bad);
    }
}

#[test]
fn test_unknown_tokens_are_ignored() {
    let segments = parse("db:shop.bogus:x.schema:public.folder:nonsense").unwrap();
    assert_eq!(
        segments,
        vec![
            Segment::Database("shop".into()),
            Segment::Schema("public".into())
        ]
    );
    assert_eq!(classify("bogus:x"), NodeKind::Unknown);
}

#[test]
fn test_resolve_full_path() {
    let path = NodePath::resolve("db:shop.schema:sales.folder:views.view:v_orders", None).unwrap();
    assert_eq!(path.database.as_deref(), Some("shop"));
    assert_eq!(path.schema.as_deref(), Some("sales"));
    assert_eq!(path.folder, Some(FolderKind::Views));
    assert_eq!(path.object, Some(Segment::View("v_orders".into())));
}
