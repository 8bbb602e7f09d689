use glam::IVec2;
use jstage::error::EngineError;
use jstage::sprite::{Model, Sequence, Step};

fn show(image: &str, x: i32, y: i32) -> Step {
    Step::Show { image: image.to_string(), displacement: IVec2::new(x, y) }
}

#[test]
fn parses_the_flat_list_form() {
    let seq = Sequence::from_json(r#"[true, ["main", [0, 0]], 1000, ["hidden", [2, -3]], 500, "main"]"#).unwrap();
    assert!(seq.looping());
    assert_eq!(
        seq.steps(),
        vec![show("main", 0, 0), Step::Wait(1000), show("hidden", 2, -3), Step::Wait(500), show("main", 0, 0)]
    );
    assert_eq!(seq.len(), 5);
    assert_eq!(seq.images(), vec!["main", "hidden"]);
}

#[test]
fn finite_sequences_need_no_delay() {
    let seq = Sequence::from_json(r#"[false, ["a", [0, 0]]]"#).unwrap();
    assert!(!seq.looping());
    assert_eq!(seq.len(), 1);

    let empty = Sequence::from_json("[false]").unwrap();
    assert!(empty.is_empty());
}

#[test]
fn malformed_sequences_are_rejected() {
    for json in [
        "[]",
        r#"[["a", [0, 0]], 100]"#,
        r#"[true, ["a", [0, 0]], true]"#,
        r#"[false, ["a", [0, 0]], 0]"#,
        r#"[false, ["a", [0, 0]], -5]"#,
        r#"[true, ["a", [0, 0]]]"#,
        r#"[false, ["a", [0]]]"#,
        r#"{"loop": true}"#,
    ] {
        assert!(Sequence::from_json(json).is_err(), "{json}");
    }
}

#[test]
fn constructor_validates_delays() {
    assert!(matches!(
        Sequence::new(false, vec![show("a", 0, 0), Step::Wait(0)]),
        Err(EngineError::InvalidSequence(_))
    ));
    assert!(matches!(Sequence::new(true, vec![show("a", 0, 0)]), Err(EngineError::InvalidSequence(_))));
    assert!(Sequence::new(true, vec![show("a", 0, 0), Step::Wait(1)]).is_ok());
    assert!(matches!(Sequence::new(true, Vec::new()), Err(EngineError::InvalidSequence(_))));
    assert!(Sequence::new(false, Vec::new()).unwrap().is_empty());
}

#[test]
fn model_loads_named_sequences() {
    let mut model = Model::new();
    let count = model
        .load_sequences_json(
            r#"{
                "idle": [true, ["stand", [0, 0]], 300],
                "jump": [false, ["crouch", [0, 0]], 50, ["air", [0, -8]], 200, ["stand", [0, 0]]]
            }"#,
        )
        .unwrap();
    assert_eq!(count, 2);
    assert_eq!(model.sequence("jump").unwrap().images(), vec!["crouch", "air", "stand"]);
    let mut names: Vec<&str> = model.sequence_names().collect();
    names.sort();
    assert_eq!(names, vec!["idle", "jump"]);

    assert!(model.load_sequences_json(r#"{ "bad": [true] }"#).is_err());
    assert!(model.sequence("bad").is_none());
}

#[test]
fn image_files_are_decoded_into_the_model() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dot.png");
    image::RgbaImage::from_pixel(3, 2, image::Rgba([1, 2, 3, 255])).save(&path).unwrap();

    let mut model = Model::new();
    model.insert_image_file("dot", &path).unwrap();
    assert_eq!(model.image("dot").unwrap().dimensions(), (3, 2));
    assert!(model.insert_image_file("missing", dir.path().join("nope.png")).is_err());
    assert!(!model.has_image("missing"));
}
