mod common;

use common::{create_basic, create_resource};
use tabula_store::{DimensionKey, ElementInput, TabulaError, TabulaResult, Value};
use tempfile::tempdir;
use time::macros::datetime;

#[test]
fn scalar_updates_are_type_checked() -> TabulaResult<()> {
    let dir = tempdir().expect("tempdir");
    let db = create_basic(dir.path())?;
    db.create_element("Plant", ElementInput::new().scalar("label", "p1"))?;
    db.update_scalar_parameter("Plant", "capacity", "p1", 7.5)?;
    assert_eq!(
        db.read_scalar_parameter("Plant", "capacity", "p1", None)?,
        Value::Float(7.5)
    );
    assert!(matches!(
        db.update_scalar_parameter("Plant", "capacity", "p1", "big"),
        Err(TabulaError::Type { .. })
    ));
    assert!(matches!(
        db.update_scalar_parameter("Plant", "resource_id", "p1", 1i64),
        Err(TabulaError::Type { .. })
    ));
    Ok(())
}

#[test]
fn vector_updates_keep_their_length() -> TabulaResult<()> {
    let dir = tempdir().expect("tempdir");
    let db = create_basic(dir.path())?;
    db.create_element(
        "Plant",
        ElementInput::new()
            .scalar("label", "p1")
            .list("value1", [1.0, 2.0]),
    )?;
    db.create_element("Plant", ElementInput::new().scalar("label", "p2"))?;

    db.update_vector_parameters("Plant", "value1", "p1", [3.0, 4.0])?;
    assert_eq!(
        db.read_vector_parameter("Plant", "value1", "p1")?,
        vec![Value::Float(3.0), Value::Float(4.0)]
    );
    assert!(matches!(
        db.update_vector_parameters("Plant", "value1", "p1", [1.0]),
        Err(TabulaError::Shape { .. })
    ));
    assert_eq!(db.read_vector_parameter("Plant", "value1", "p1")?.len(), 2);

    // An element without rows starts its vector here.
    db.update_vector_parameters("Plant", "value1", "p2", [9.0])?;
    assert_eq!(
        db.read_vector_parameter("Plant", "value1", "p2")?,
        vec![Value::Float(9.0)]
    );
    Ok(())
}

#[test]
fn relations_can_be_rewired() -> TabulaResult<()> {
    let dir = tempdir().expect("tempdir");
    let db = create_basic(dir.path())?;
    db.create_element("Resource", ElementInput::new().scalar("label", "r1"))?;
    db.create_element("Resource", ElementInput::new().scalar("label", "r2"))?;
    db.create_element(
        "Plant",
        ElementInput::new()
            .scalar("label", "p1")
            .list("resource_cascade", ["r1"])
            .list("factor", [1.0]),
    )?;
    db.create_element("Plant", ElementInput::new().scalar("label", "p2"))?;

    db.set_scalar_relation("Plant", "Resource", "p1", "r2", "id")?;
    db.set_scalar_relation("Plant", "Plant", "p1", "p2", "spill_to")?;
    db.set_set_relation("Plant", "Resource", "p1", ["r2"], "cascade")?;
    assert_eq!(db.read_scalar_relation("Plant", "Resource", "id", "p1")?, "r2");
    assert_eq!(db.read_scalar_relation("Plant", "Plant", "spill_to", "p1")?, "p2");
    assert_eq!(
        db.read_set_relations("Plant", "Resource", "cascade")?[0],
        vec!["r2".to_string()]
    );
    assert!(matches!(
        db.set_scalar_relation("Plant", "Plant", "p1", "p1", "spill_to"),
        Err(TabulaError::Integrity { .. })
    ));
    assert!(matches!(
        db.set_scalar_relation("Plant", "Resource", "p1", "r1", "unknown"),
        Err(TabulaError::NotFound { .. })
    ));
    Ok(())
}

#[test]
fn time_series_rows_can_be_added_and_updated() -> TabulaResult<()> {
    let dir = tempdir().expect("tempdir");
    let db = create_basic(dir.path())?;
    create_resource(&db, "r1", 1.0, 2.0)?;
    let key = DimensionKey::at(datetime!(2003-01-01 00:00:00));
    db.add_time_series_row("Resource", "some_vector1", "r1", 3.0, &key)?;
    db.update_time_series_row("Resource", "some_vector1", "r1", 4.0, &key)?;
    let frame = db.read_time_series_table("Resource", "some_vector1", "r1")?;
    assert_eq!(
        frame.get("some_vector1"),
        Some(&[Value::Float(1.0), Value::Float(2.0), Value::Float(4.0)][..])
    );
    let missing = DimensionKey::at(datetime!(1999-01-01 00:00:00));
    assert!(matches!(
        db.update_time_series_row("Resource", "some_vector1", "r1", 0.0, &missing),
        Err(TabulaError::NotFound { .. })
    ));
    let with_block = key.clone().with("block", 1);
    assert!(matches!(
        db.add_time_series_row("Resource", "some_vector1", "r1", 0.0, &with_block),
        Err(TabulaError::Shape { .. })
    ));
    Ok(())
}

#[test]
fn time_series_files_take_relative_paths() -> TabulaResult<()> {
    let dir = tempdir().expect("tempdir");
    let db = create_basic(dir.path())?;
    assert_eq!(db.read_time_series_file("Resource", "inflow_file")?, "");
    db.set_time_series_file("Resource", &[("inflow_file", "inputs/inflow.csv")])?;
    db.set_time_series_file("Resource", &[("demand_file", "inputs/demand.csv")])?;
    assert_eq!(
        db.read_time_series_file("Resource", "inflow_file")?,
        "inputs/inflow.csv"
    );
    assert_eq!(
        db.read_time_series_file("Resource", "demand_file")?,
        "inputs/demand.csv"
    );
    assert!(matches!(
        db.set_time_series_file("Resource", &[("inflow_file", "/abs/inflow.csv")]),
        Err(TabulaError::Type { .. })
    ));
    Ok(())
}

#[test]
fn deleting_an_element_cascades_and_unlinks() -> TabulaResult<()> {
    let dir = tempdir().expect("tempdir");
    let db = create_basic(dir.path())?;
    create_resource(&db, "r1", 1.0, 2.0)?;
    db.create_element(
        "Plant",
        ElementInput::new()
            .scalar("label", "p1")
            .scalar("resource_id", "r1")
            .list("resource_cascade", ["r1"])
            .list("factor", [1.0]),
    )?;
    db.create_element(
        "Plant",
        ElementInput::new()
            .scalar("label", "p2")
            .scalar("plant_spill_to", "p1")
            .list("plant_turbine_to", ["p1"]),
    )?;

    db.delete_element("Resource", "r1")?;
    assert_eq!(db.number_of_elements("Resource")?, 0);
    assert_eq!(db.read_scalar_relations("Plant", "Resource", "id")?, vec!["", ""]);
    assert_eq!(
        db.read_set_relations("Plant", "Resource", "cascade")?,
        vec![Vec::<String>::new(), vec![]]
    );

    db.delete_element("Plant", "p1")?;
    assert_eq!(db.read_element_labels("Plant")?, vec!["p2"]);
    assert_eq!(db.read_scalar_relations("Plant", "Plant", "spill_to")?, vec![""]);
    assert_eq!(
        db.read_vector_relations("Plant", "Plant", "turbine_to")?,
        vec![Vec::<String>::new()]
    );
    Ok(())
}

#[test]
fn deleting_a_time_series_keeps_the_element() -> TabulaResult<()> {
    let dir = tempdir().expect("tempdir");
    let db = create_basic(dir.path())?;
    create_resource(&db, "r1", 1.0, 2.0)?;
    db.delete_time_series("Resource", "group1", "r1")?;
    assert_eq!(db.number_of_elements("Resource")?, 1);
    let frame = db.read_time_series_table("Resource", "some_vector1", "r1")?;
    assert_eq!(frame.row_count()?, 0);
    Ok(())
}

#[test]
fn relations_can_be_cleared() -> TabulaResult<()> {
    let dir = tempdir().expect("tempdir");
    let db = create_basic(dir.path())?;
    db.create_element("Resource", ElementInput::new().scalar("label", "r1"))?;
    db.create_element("Plant", ElementInput::new().scalar("label", "p1"))?;
    db.create_element(
        "Plant",
        ElementInput::new()
            .scalar("label", "p2")
            .scalar("resource_id", "r1")
            .scalar("plant_spill_to", "p1")
            .list("plant_turbine_to", ["p1"]),
    )?;

    db.set_scalar_relation("Plant", "Plant", "p2", "", "spill_to")?;
    assert_eq!(db.read_scalar_relation("Plant", "Plant", "spill_to", "p2")?, "");
    assert_eq!(
        db.read_scalar_relation_ids("Plant", "Plant", "spill_to")?,
        vec![i64::MIN, i64::MIN]
    );

    db.set_scalar_relation("Plant", "Resource", "p2", i64::MIN, "id")?;
    assert_eq!(db.read_scalar_relations("Plant", "Resource", "id")?, vec!["", ""]);

    db.set_vector_relation("Plant", "Plant", "p2", [""], "turbine_to")?;
    assert_eq!(
        db.read_vector_relation_ids("Plant", "Plant", "turbine_to")?,
        vec![vec![], vec![i64::MIN]]
    );

    // A cleared link can be set again.
    db.set_scalar_relation("Plant", "Plant", "p2", "p1", "spill_to")?;
    assert_eq!(db.read_scalar_relation("Plant", "Plant", "spill_to", "p2")?, "p1");
    Ok(())
}
