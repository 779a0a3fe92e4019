mod common;

use common::{create_basic, create_configuration, create_resource};
use tabula_store::{ElementInput, TabulaError, TabulaResult, TimeSeriesFrame, Value};
use tempfile::tempdir;
use time::macros::datetime;

#[test]
fn creates_and_reads_scalars() -> TabulaResult<()> {
    let dir = tempdir().expect("tempdir");
    let db = create_basic(dir.path())?;
    create_configuration(&db)?;
    db.create_element(
        "Resource",
        ElementInput::new()
            .scalar("label", "r1")
            .scalar("type", "E")
            .scalar("some_value", 5i64),
    )?;
    db.create_element("Resource", ElementInput::new().scalar("label", "r2"))?;

    assert_eq!(db.number_of_elements("Resource")?, 2);
    assert_eq!(db.read_element_labels("Resource")?, vec!["r1", "r2"]);
    assert_eq!(
        db.read_scalar_parameters("Resource", "some_value", None)?,
        vec![Value::Integer(5), Value::Integer(i64::MIN)]
    );
    assert_eq!(
        db.read_scalar_parameters("Resource", "type", Some(Value::from("H")))?,
        vec![Value::from("E"), Value::from("H")]
    );
    assert_eq!(
        db.read_scalar_parameter("Resource", "type", "r2", None)?,
        Value::from("")
    );
    assert_eq!(
        db.read_scalar_parameter("Configuration", "value1", 1i64, None)?,
        Value::Float(1.0)
    );
    Ok(())
}

#[test]
fn schema_defaults_fill_unset_scalars() -> TabulaResult<()> {
    let dir = tempdir().expect("tempdir");
    let db = create_basic(dir.path())?;
    db.create_element("Plant", ElementInput::new().scalar("label", "p1"))?;
    assert_eq!(
        db.read_scalar_parameter("Plant", "capacity", "p1", None)?,
        Value::Float(2.0)
    );
    Ok(())
}

#[test]
fn configuration_holds_one_element() -> TabulaResult<()> {
    let dir = tempdir().expect("tempdir");
    let db = create_basic(dir.path())?;
    create_configuration(&db)?;
    assert!(matches!(
        db.create_element("Configuration", ElementInput::new().scalar("label", "again")),
        Err(TabulaError::Integrity { .. })
    ));
    assert_eq!(db.number_of_elements("Configuration")?, 1);
    Ok(())
}

#[test]
fn missing_group_members_read_as_null() -> TabulaResult<()> {
    let dir = tempdir().expect("tempdir");
    let db = create_basic(dir.path())?;
    db.create_element(
        "Plant",
        ElementInput::new()
            .scalar("label", "p1")
            .list("value1", [1.0, 2.0, 3.0]),
    )?;
    let value2 = db.read_vector_parameter("Plant", "value2", "p1")?;
    assert_eq!(value2.len(), 3);
    assert!(value2.iter().all(Value::is_null));
    assert_eq!(
        db.read_vector_parameter("Plant", "value1", "p1")?,
        vec![Value::Float(1.0), Value::Float(2.0), Value::Float(3.0)]
    );
    Ok(())
}

#[test]
fn vectors_of_every_element_follow_id_order() -> TabulaResult<()> {
    let dir = tempdir().expect("tempdir");
    let db = create_basic(dir.path())?;
    db.create_element(
        "Resource",
        ElementInput::new().scalar("label", "r1").list("weight", [0.5]),
    )?;
    db.create_element("Resource", ElementInput::new().scalar("label", "r2"))?;
    db.create_element(
        "Resource",
        ElementInput::new()
            .scalar("label", "r3")
            .list("weight", [1.0, 2.0]),
    )?;
    assert_eq!(
        db.read_vector_parameters("Resource", "weight")?,
        vec![
            vec![Value::Float(0.5)],
            vec![],
            vec![Value::Float(1.0), Value::Float(2.0)],
        ]
    );
    Ok(())
}

#[test]
fn relations_accept_labels_and_ids() -> TabulaResult<()> {
    let dir = tempdir().expect("tempdir");
    let db = create_basic(dir.path())?;
    let r1 = db.create_element("Resource", ElementInput::new().scalar("label", "r1"))?;
    db.create_element("Resource", ElementInput::new().scalar("label", "r2"))?;
    db.create_element(
        "Plant",
        ElementInput::new()
            .scalar("label", "p1")
            .scalar("resource_id", r1)
            .list("resource_cascade", ["r1", "r2"])
            .list("factor", [0.25, 0.75]),
    )?;
    db.create_element(
        "Plant",
        ElementInput::new()
            .scalar("label", "p2")
            .scalar("resource_id", "r2")
            .scalar("plant_spill_to", "p1")
            .list("plant_turbine_to", ["p1"]),
    )?;

    assert_eq!(db.read_scalar_relations("Plant", "Resource", "id")?, vec!["r1", "r2"]);
    assert_eq!(db.read_scalar_relations("Plant", "Plant", "spill_to")?, vec!["", "p1"]);
    assert_eq!(
        db.read_scalar_relation_ids("Plant", "Plant", "spill_to")?,
        vec![i64::MIN, 1]
    );
    assert_eq!(db.read_scalar_relation("Plant", "Resource", "id", "p2")?, "r2");
    assert_eq!(
        db.read_set_relations("Plant", "Resource", "cascade")?,
        vec![vec!["r1".to_string(), "r2".to_string()], vec![]]
    );
    assert_eq!(
        db.read_vector_relations("Plant", "Plant", "turbine_to")?,
        vec![vec![], vec!["p1".to_string()]]
    );
    Ok(())
}

#[test]
fn unknown_related_label_is_not_found() -> TabulaResult<()> {
    let dir = tempdir().expect("tempdir");
    let db = create_basic(dir.path())?;
    let result = db.create_element(
        "Plant",
        ElementInput::new()
            .scalar("label", "p1")
            .scalar("resource_id", "nowhere"),
    );
    assert!(matches!(result, Err(TabulaError::NotFound { .. })));
    assert_eq!(db.number_of_elements("Plant")?, 0);
    Ok(())
}

#[test]
fn wrong_value_types_are_rejected() -> TabulaResult<()> {
    let dir = tempdir().expect("tempdir");
    let db = create_basic(dir.path())?;
    assert!(matches!(
        db.create_element(
            "Resource",
            ElementInput::new().scalar("label", "r1").scalar("some_value", 1.5),
        ),
        Err(TabulaError::Type { .. })
    ));
    assert!(matches!(
        db.create_element(
            "Resource",
            ElementInput::new().scalar("label", "r1").list("type", ["E"]),
        ),
        Err(TabulaError::Type { .. })
    ));
    assert!(matches!(
        db.read_vector_parameters("Resource", "some_value"),
        Err(TabulaError::Type { .. })
    ));
    Ok(())
}

#[test]
fn time_series_frames_round_trip_through_create() -> TabulaResult<()> {
    let dir = tempdir().expect("tempdir");
    let db = create_basic(dir.path())?;
    create_resource(&db, "r1", 10.0, 20.0)?;
    let frame = db.read_time_series_table("Resource", "some_vector1", "r1")?;
    assert_eq!(
        frame.get("date_time"),
        Some(
            &[
                Value::Timestamp(datetime!(2001-01-01 00:00:00)),
                Value::Timestamp(datetime!(2002-01-01 00:00:00)),
            ][..]
        )
    );
    assert_eq!(
        frame.get("some_vector1"),
        Some(&[Value::Float(10.0), Value::Float(20.0)][..])
    );
    Ok(())
}

#[test]
fn extra_dimensions_are_required_in_frames() -> TabulaResult<()> {
    let dir = tempdir().expect("tempdir");
    let db = create_basic(dir.path())?;
    let without_block = TimeSeriesFrame::new()
        .column("date_time", [datetime!(2001-01-01 00:00:00)])
        .column("generation", [1.0]);
    assert!(matches!(
        db.create_element(
            "Resource",
            ElementInput::new()
                .scalar("label", "r1")
                .time_series("blocks", without_block),
        ),
        Err(TabulaError::Shape { .. })
    ));
    let with_block = TimeSeriesFrame::new()
        .column(
            "date_time",
            [datetime!(2001-01-01 00:00:00), datetime!(2001-01-01 00:00:00)],
        )
        .column("block", [1i64, 2])
        .column("generation", [1.0, 2.0]);
    db.create_element(
        "Resource",
        ElementInput::new()
            .scalar("label", "r1")
            .time_series("blocks", with_block),
    )?;
    let frame = db.read_time_series_table("Resource", "generation", "r1")?;
    assert_eq!(
        frame.get("block"),
        Some(&[Value::Integer(1), Value::Integer(2)][..])
    );
    Ok(())
}

#[test]
fn grouped_relations_read_back_by_id() -> TabulaResult<()> {
    let dir = tempdir().expect("tempdir");
    let db = create_basic(dir.path())?;
    let first = db.create_element("Cost", ElementInput::new().scalar("amount", 1.5))?;
    let second = db.create_element("Cost", ElementInput::new())?;
    let r1 = db.create_element("Resource", ElementInput::new().scalar("label", "r1"))?;
    let r2 = db.create_element("Resource", ElementInput::new().scalar("label", "r2"))?;
    db.create_element(
        "Plant",
        ElementInput::new()
            .scalar("label", "p1")
            .list("cost_id", [second, first]),
    )?;
    db.create_element("Plant", ElementInput::new().scalar("label", "p2"))?;

    assert_eq!(
        db.read_vector_relation_ids("Plant", "Cost", "id")?,
        vec![vec![second, first], vec![]]
    );
    assert!(matches!(
        db.read_vector_relations("Plant", "Cost", "id"),
        Err(TabulaError::NotFound { .. })
    ));

    db.set_vector_relation("Plant", "Cost", "p1", [first, second], "id")?;
    db.set_set_relation("Plant", "Resource", "p2", [r2, r1], "cascade")?;
    assert_eq!(
        db.read_vector_relation_ids("Plant", "Cost", "id")?[0],
        vec![first, second]
    );
    assert_eq!(
        db.read_set_relation_ids("Plant", "Resource", "cascade")?,
        vec![vec![], vec![r2, r1]]
    );
    Ok(())
}
