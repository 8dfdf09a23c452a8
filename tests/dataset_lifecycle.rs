//! Dataset lifecycle: create, add and remove layers, reopen from disk, import

use std::collections::BTreeSet;
use std::sync::Arc;
use tempfile::TempDir;
use wkdataset::{
    Category, CopyImporter, DataFormat, DataType, Dataset, DatasetError, DatasetProperties,
    FormatOptions, LayerSpec, Mag, MemoryEngine, VoxelBlock, VoxelType, PROPERTIES_FILE_NAME,
};

fn manifest_json(dataset: &Dataset) -> serde_json::Value {
    let bytes = std::fs::read(dataset.path().join(PROPERTIES_FILE_NAME)).unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Create, add a 3-channel color layer, reopen and compare
#[tokio::test]
async fn test_reopen_reconstructs_layers() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("my_dataset");

    let mut dataset = Dataset::create(&path, [1.0, 1.0, 2.0], FormatOptions::Wkw)
        .await
        .unwrap();
    let layer = dataset
        .add_layer(LayerSpec::color("color").with_num_channels(3))
        .await
        .unwrap();
    assert_eq!(layer.dtype_per_layer().unwrap(), "uint24");
    assert_eq!(layer.dtype_per_channel(), DataType::U8);
    dataset.add_mag("color", Mag::ONE).await.unwrap();
    dataset.add_mag("color", "2".parse().unwrap()).await.unwrap();

    let json = manifest_json(&dataset);
    assert_eq!(json["id"]["name"], "my_dataset");
    assert_eq!(json["scale"], serde_json::json!([1.0, 1.0, 2.0]));
    let layers = json["dataLayers"].as_array().unwrap();
    assert_eq!(layers.len(), 1);
    assert_eq!(layers[0]["elementClass"], "uint24");
    assert_eq!(layers[0]["numChannels"], 3);
    assert_eq!(layers[0]["category"], "color");

    let reopened = Dataset::open(&path).await.unwrap();
    let original = dataset.get_layer("color").unwrap();
    let layer = reopened.get_layer("color").unwrap();
    assert_eq!(layer.category(), original.category());
    assert_eq!(layer.dtype_per_channel(), original.dtype_per_channel());
    assert_eq!(layer.num_channels(), original.num_channels());
    let mags: BTreeSet<Mag> = layer.mags().keys().copied().collect();
    let original_mags: BTreeSet<Mag> = original.mags().keys().copied().collect();
    assert_eq!(mags, original_mags);
    assert_eq!(reopened.properties(), dataset.properties());
}

#[tokio::test]
async fn test_open_missing_dataset() {
    let temp_dir = TempDir::new().unwrap();
    assert!(matches!(
        Dataset::open(temp_dir.path().join("nothing")).await,
        Err(DatasetError::DatasetNotFound(_))
    ));
}

#[tokio::test]
async fn test_get_or_create() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("ds");

    let created = Dataset::get_or_create(&path, [2.0, 2.0, 2.0], FormatOptions::Wkw)
        .await
        .unwrap();
    assert_eq!(created.scale(), [2.0, 2.0, 2.0]);
    let opened = Dataset::get_or_create(&path, [2.0, 2.0, 2.0], FormatOptions::Wkw)
        .await
        .unwrap();
    assert_eq!(opened.properties(), created.properties());

    assert!(matches!(
        Dataset::get_or_create(&path, [1.0, 1.0, 1.0], FormatOptions::Wkw).await,
        Err(DatasetError::ConfigMismatch(_))
    ));
    assert!(matches!(
        Dataset::get_or_create(&path, [2.0, 2.0, 2.0], FormatOptions::Tiff { pattern: None })
            .await,
        Err(DatasetError::ConfigMismatch(_))
    ));
}

#[tokio::test]
async fn test_get_or_create_tiled_tiff() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("tiled");
    let format = FormatOptions::TiledTiff {
        tile_size: [128, 128],
        pattern: None,
    };

    let dataset = Dataset::get_or_create(&path, [1.0; 3], format.clone())
        .await
        .unwrap();
    assert_eq!(dataset.data_format(), DataFormat::TiledTiff);
    let json = manifest_json(&dataset);
    assert_eq!(json["pattern"], "{xxxxx}/{yyyyy}/{zzzzz}.tif");
    assert_eq!(json["tileSize"], serde_json::json!([128, 128]));

    Dataset::get_or_create(&path, [1.0; 3], format).await.unwrap();
    let other_tiles = FormatOptions::TiledTiff {
        tile_size: [64, 64],
        pattern: None,
    };
    assert!(matches!(
        Dataset::get_or_create(&path, [1.0; 3], other_tiles).await,
        Err(DatasetError::ConfigMismatch(_))
    ));
}

#[tokio::test]
async fn test_get_or_add_layer_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let mut dataset = Dataset::create(temp_dir.path().join("ds"), [1.0; 3], FormatOptions::Wkw)
        .await
        .unwrap();

    let spec = LayerSpec::segmentation("seg")
        .with_dtype_per_channel("uint32")
        .with_largest_segment_id(41);
    let first = dataset.get_or_add_layer(spec.clone()).await.unwrap().name().to_string();
    let second = dataset.get_or_add_layer(spec).await.unwrap().name().to_string();
    assert_eq!(first, second);
    assert_eq!(dataset.layers().len(), 1);

    let json = manifest_json(&dataset);
    let layers = json["dataLayers"].as_array().unwrap();
    assert_eq!(layers.len(), 1);
    assert_eq!(layers[0]["largestSegmentId"], 41);

    assert!(matches!(
        dataset.get_or_add_layer(LayerSpec::color("seg")).await,
        Err(DatasetError::ConfigMismatch(_))
    ));
    assert!(matches!(
        dataset
            .get_or_add_layer(LayerSpec::segmentation("seg").with_dtype_per_channel("uint8"))
            .await,
        Err(DatasetError::ConfigMismatch(_))
    ));
}

#[tokio::test]
async fn test_delete_layer_removes_entry_and_files() {
    let temp_dir = TempDir::new().unwrap();
    let mut dataset = Dataset::create(temp_dir.path().join("ds"), [1.0; 3], FormatOptions::Wkw)
        .await
        .unwrap();
    dataset.add_layer(LayerSpec::color("color")).await.unwrap();
    dataset.add_mag("color", Mag::ONE).await.unwrap();
    let block = VoxelBlock::from_bytes([2, 2, 1], VoxelType::new(DataType::U8, 1), vec![1, 2, 3, 4])
        .unwrap();
    dataset.write_data("color", Mag::ONE, [0, 0, 0], &block).await.unwrap();

    let layer_dir = dataset.path().join("color");
    assert!(layer_dir.join("1").exists());

    dataset.delete_layer("color").await.unwrap();
    assert!(!layer_dir.exists());
    assert!(matches!(
        dataset.get_layer("color"),
        Err(DatasetError::UnknownLayer(_))
    ));
    assert!(manifest_json(&dataset)["dataLayers"].as_array().unwrap().is_empty());
    assert!(matches!(
        dataset.delete_layer("color").await,
        Err(DatasetError::UnknownLayer(_))
    ));

    // the name is free again
    dataset.add_layer(LayerSpec::color("color")).await.unwrap();
}

async fn foreign_dataset(root: &std::path::Path) -> Dataset {
    let mut foreign = Dataset::create(root.join("foreign"), [1.0; 3], FormatOptions::Wkw)
        .await
        .unwrap();
    foreign
        .add_layer(LayerSpec::color("color").with_dtype_per_channel("uint16"))
        .await
        .unwrap();
    foreign.add_mag("color", Mag::ONE).await.unwrap();
    let block = VoxelBlock::from_bytes(
        [2, 1, 1],
        VoxelType::new(DataType::U16, 1),
        vec![0x34, 0x12, 0x78, 0x56],
    )
    .unwrap();
    foreign.write_data("color", Mag::ONE, [5, 6, 7], &block).await.unwrap();
    foreign
}

#[cfg(unix)]
#[tokio::test]
async fn test_add_symlink_layer() {
    let temp_dir = TempDir::new().unwrap();
    let foreign = foreign_dataset(temp_dir.path()).await;
    let mut dataset = Dataset::create(temp_dir.path().join("ds"), [1.0; 3], FormatOptions::Wkw)
        .await
        .unwrap();

    let layer = dataset
        .add_symlink_layer(foreign.path().join("color"))
        .await
        .unwrap();
    assert_eq!(layer.name(), "color");
    assert_eq!(layer.dtype_per_channel(), DataType::U16);
    assert!(layer.mags().contains_key(&Mag::ONE));
    assert_eq!(
        dataset.properties().layer("color"),
        foreign.properties().layer("color")
    );

    let link = dataset.path().join("color");
    assert!(std::fs::symlink_metadata(&link).unwrap().file_type().is_symlink());

    let view = dataset
        .get_view("color", Mag::ONE, [2, 1, 1], Some([5, 6, 7]), true)
        .unwrap();
    assert_eq!(view.read_all().await.unwrap().to_bytes(), vec![0x34, 0x12, 0x78, 0x56]);

    assert!(matches!(
        dataset.add_symlink_layer(foreign.path().join("color")).await,
        Err(DatasetError::DuplicateLayer(_))
    ));

    // deleting the link leaves the foreign data alone
    dataset.delete_layer("color").await.unwrap();
    assert!(!link.exists());
    assert!(foreign.path().join("color/1").exists());
    Dataset::open(foreign.path()).await.unwrap().get_layer("color").unwrap();
}

#[tokio::test]
async fn test_copy_import_survives_source_removal() {
    let temp_dir = TempDir::new().unwrap();
    let foreign = foreign_dataset(temp_dir.path()).await;
    let mut dataset = Dataset::create(temp_dir.path().join("ds"), [1.0; 3], FormatOptions::Wkw)
        .await
        .unwrap();

    dataset
        .import_layer(foreign.path().join("color"), &CopyImporter)
        .await
        .unwrap();
    std::fs::remove_dir_all(foreign.path()).unwrap();

    let reopened = Dataset::open(dataset.path()).await.unwrap();
    let view = reopened
        .get_view("color", Mag::ONE, [2, 1, 1], Some([5, 6, 7]), true)
        .unwrap();
    assert_eq!(view.read_all().await.unwrap().to_bytes(), vec![0x34, 0x12, 0x78, 0x56]);
}

#[cfg(unix)]
#[tokio::test]
async fn test_symlink_to_a_linked_layer_keeps_its_mags() {
    let temp_dir = TempDir::new().unwrap();
    let foreign = foreign_dataset(temp_dir.path()).await;
    let mag2: Mag = "2".parse().unwrap();

    let mut linked = Dataset::create(temp_dir.path().join("linked"), [1.0; 3], FormatOptions::Wkw)
        .await
        .unwrap();
    linked
        .add_symlink_layer(foreign.path().join("color"))
        .await
        .unwrap();
    linked.add_mag("color", mag2).await.unwrap();

    let mut dataset = Dataset::create(temp_dir.path().join("ds"), [1.0; 3], FormatOptions::Wkw)
        .await
        .unwrap();
    let layer = dataset
        .add_symlink_layer(linked.path().join("color"))
        .await
        .unwrap();
    let mags: Vec<Mag> = layer.mags().keys().copied().collect();
    assert_eq!(mags, vec![Mag::ONE, mag2]);
    assert_eq!(
        dataset.properties().layer("color"),
        linked.properties().layer("color")
    );
    assert_eq!(
        std::fs::read_link(dataset.path().join("color")).unwrap(),
        linked.path().join("color")
    );
}

#[cfg(unix)]
#[tokio::test]
async fn test_failed_copy_import_leaves_no_trace() {
    let temp_dir = TempDir::new().unwrap();
    let foreign = foreign_dataset(temp_dir.path()).await;
    let dangling = foreign.path().join("color/1/dangling");
    std::os::unix::fs::symlink(temp_dir.path().join("missing"), &dangling).unwrap();

    let mut dataset = Dataset::create(temp_dir.path().join("ds"), [1.0; 3], FormatOptions::Wkw)
        .await
        .unwrap();
    assert!(matches!(
        dataset
            .import_layer(foreign.path().join("color"), &CopyImporter)
            .await,
        Err(DatasetError::Filesystem { .. })
    ));
    assert!(std::fs::symlink_metadata(dataset.path().join("color")).is_err());
    assert!(dataset.layers().is_empty());

    // nothing stale blocks the next attempt
    std::fs::remove_file(&dangling).unwrap();
    dataset
        .import_layer(foreign.path().join("color"), &CopyImporter)
        .await
        .unwrap();
    assert!(dataset.path().join("color/1").exists());
}

#[tokio::test]
async fn test_import_of_unknown_layer_leaves_no_trace() {
    let temp_dir = TempDir::new().unwrap();
    let foreign = foreign_dataset(temp_dir.path()).await;
    let stray = foreign.path().join("not_a_layer");
    std::fs::create_dir_all(&stray).unwrap();

    let mut dataset = Dataset::create(temp_dir.path().join("ds"), [1.0; 3], FormatOptions::Wkw)
        .await
        .unwrap();
    assert!(matches!(
        dataset.import_layer(&stray, &CopyImporter).await,
        Err(DatasetError::UnknownLayer(_))
    ));
    assert!(!dataset.path().join("not_a_layer").exists());
    assert!(dataset.layers().is_empty());
}

#[tokio::test]
async fn test_tiff_dataset_layers_inherit_pattern() {
    let temp_dir = TempDir::new().unwrap();
    let engine = MemoryEngine::new();
    let mut dataset = Dataset::create_with_engine(
        temp_dir.path().join("tiffs"),
        [1.0; 3],
        FormatOptions::Tiff {
            pattern: Some("slice_{zzzz}.tif".to_string()),
        },
        Arc::new(engine.clone()),
    )
    .await
    .unwrap();
    dataset
        .add_layer(LayerSpec::new("color", Category::Color))
        .await
        .unwrap();
    dataset.add_mag("color", Mag::ONE).await.unwrap();

    let layer = dataset.properties().layer("color").unwrap();
    assert_eq!(layer.data_format, DataFormat::Tiff);
    assert_eq!(layer.tiff.as_ref().unwrap().pattern, "slice_{zzzz}.tif");
    assert_eq!(layer.wkw_resolutions[0].cube_length, None);
    assert_eq!(engine.len(), 1);

    let on_disk = DatasetProperties::from_json(dataset.path()).await.unwrap();
    assert_eq!(&on_disk, dataset.properties());
}
