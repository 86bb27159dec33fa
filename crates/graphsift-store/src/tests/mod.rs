use super::*;

#[test]
fn test_save_load_overwrite() -> Result<(), StorageError> {
    let mut storage = Storage::new_in_memory()?;
    assert_eq!(storage.load("graphsift.filters")?, None);

    storage.save("graphsift.filters", r#"{"session":{}}"#)?;
    assert_eq!(
        storage.load("graphsift.filters")?.as_deref(),
        Some(r#"{"session":{}}"#)
    );

    storage.save("graphsift.filters", "{}")?;
    assert_eq!(storage.load("graphsift.filters")?.as_deref(), Some("{}"));
    assert_eq!(storage.keys()?, vec!["graphsift.filters".to_string()]);
    assert!(storage.updated_at("graphsift.filters")?.is_some());
    Ok(())
}

#[test]
fn test_remove() -> Result<(), StorageError> {
    let mut storage = Storage::new_in_memory()?;
    storage.save("a", "1")?;
    assert!(storage.remove("a")?);
    assert!(!storage.remove("a")?);
    assert_eq!(storage.load("a")?, None);
    Ok(())
}

#[test]
fn test_schema_version_is_set() -> Result<(), StorageError> {
    let storage = Storage::new_in_memory()?;
    assert_eq!(storage.schema_version()?, SCHEMA_VERSION);
    Ok(())
}

#[test]
fn test_reopen_file_keeps_state() -> Result<(), StorageError> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("nested").join("state.db");
    {
        let mut storage = Storage::open(&path)?;
        storage.save("k", "v")?;
    }
    let storage = Storage::open(&path)?;
    assert_eq!(storage.load("k")?.as_deref(), Some("v"));
    Ok(())
}

#[test]
fn test_newer_schema_is_rejected() -> Result<(), StorageError> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("state.db");
    {
        let storage = Storage::open(&path)?;
        storage.set_schema_version(SCHEMA_VERSION + 1)?;
    }
    assert!(matches!(Storage::open(&path), Err(StorageError::Other(_))));
    Ok(())
}
