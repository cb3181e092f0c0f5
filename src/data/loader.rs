use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use anyhow::{bail, Context, Result};
use arrow::array::{Array, ArrayRef, Float32Array, Float64Array, LargeListArray, ListArray, StringArray};
use arrow::datatypes::DataType;
use log::{debug, info};
use ndarray::{Array2, ArrayD, Ix2, IxDyn, OwnedRepr};
use ndarray_npy::NpzReader;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::error::DataError;
use super::model::{parse_key, Dataset, Item};

/// Raw archive contents: key → array, iterated in sorted key order.
pub type Archive = BTreeMap<String, ArrayD<f32>>;

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Read a keyed archive.  Dispatch by extension.
///
/// Supported formats:
/// * `.npz`     – NumPy archive, one float32/float64 member per key
/// * `.json`    – `{ "<key>": [[...], ...], ... }`
/// * `.parquet` – `key` string column and a `frames` list column
pub fn read_archive(path: &Path) -> Result<Archive> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "npz" => read_npz(path),
        "json" => read_json(path),
        "parquet" | "pq" => read_parquet(path),
        other => bail!("Unsupported archive extension: .{other}"),
    }
}

/// Load a dataset of `(time steps, d_frame)` samples, sorted by key.
///
/// Items with `rows <= min_length` are skipped. An archive without items
/// yields an empty dataset.
pub fn load_dataset(path: &Path, min_length: Option<usize>) -> Result<Dataset> {
    info!("Reading: {}", path.display());
    let archive = read_archive(path)?;

    let mut items = Vec::with_capacity(archive.len());
    for (key, array) in archive {
        let sample = into_frames(&key, array)?;
        if let Some(min_length) = min_length {
            if sample.nrows() <= min_length {
                debug!("Skipping {key}: {} frames", sample.nrows());
                continue;
            }
        }
        items.push(Item::from_key(&key, sample)?);
    }

    info!("No. items: {}", items.len());
    if let Some(first) = items.first() {
        info!("E.g. item shape: {:?}", first.sample.dim());
    }
    Ok(Dataset::new(items))
}

/// Fixed-dimensional embeddings keyed like a [`Dataset`].
#[derive(Debug, Clone, PartialEq)]
pub struct Embeddings {
    pub keys: Vec<String>,
    pub labels: Vec<String>,
    pub speakers: Vec<String>,
    /// Shape `(N, d)`, row `i` belongs to `keys[i]`.
    pub matrix: Array2<f32>,
}

impl Embeddings {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.matrix.ncols()
    }
}

/// Load one embedding vector per key, ordered by key.
///
/// Members must be 1-D, or 2-D with a single row.
pub fn load_embeddings(path: &Path) -> Result<Embeddings> {
    info!("Reading: {}", path.display());
    let archive = read_archive(path)?;

    let n = archive.len();
    let mut keys = Vec::with_capacity(n);
    let mut labels = Vec::with_capacity(n);
    let mut speakers = Vec::with_capacity(n);
    let mut flat = Vec::new();
    let mut dim = None;

    for (index, (key, array)) in archive.into_iter().enumerate() {
        let found = match array.shape() {
            [d] => *d,
            [1, d] => *d,
            _ => {
                return Err(DataError::Rank {
                    key,
                    expected: 1,
                    found: array.ndim(),
                }
                .into())
            }
        };
        match dim {
            None => dim = Some(found),
            Some(expected) if expected != found => {
                return Err(DataError::FeatureDim {
                    index,
                    expected,
                    found,
                }
                .into())
            }
            Some(_) => {}
        }
        let (label, speaker) = parse_key(&key)?;
        labels.push(label.to_string());
        speakers.push(speaker.to_string());
        flat.extend(array.iter().copied());
        keys.push(key);
    }

    let matrix = Array2::from_shape_vec((keys.len(), dim.unwrap_or(0)), flat)
        .context("assembling embedding matrix")?;
    info!("No. embeddings: {}", keys.len());
    info!("Embedding dimensionality: {}", matrix.ncols());
    Ok(Embeddings {
        keys,
        labels,
        speakers,
        matrix,
    })
}

fn into_frames(key: &str, array: ArrayD<f32>) -> Result<Array2<f32>> {
    let found = array.ndim();
    array.into_dimensionality::<Ix2>().map_err(|_| {
        DataError::Rank {
            key: key.to_string(),
            expected: 2,
            found,
        }
        .into()
    })
}

fn insert_unique(archive: &mut Archive, key: String, array: ArrayD<f32>) -> Result<()> {
    if archive.contains_key(&key) {
        return Err(DataError::DuplicateKey(key).into());
    }
    archive.insert(key, array);
    Ok(())
}

// ---------------------------------------------------------------------------
// NPZ loader
// ---------------------------------------------------------------------------

fn read_npz(path: &Path) -> Result<Archive> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut npz = NpzReader::new(BufReader::new(file)).context("reading npz directory")?;
    let names = npz.names().context("listing npz members")?;

    let mut archive = Archive::new();
    for (index, name) in names.iter().enumerate() {
        let key = name.strip_suffix(".npy").unwrap_or(name).to_string();
        let array = read_npz_member(&mut npz, index)
            .with_context(|| format!("reading npz member '{key}'"))?;
        insert_unique(&mut archive, key, array)?;
    }
    Ok(archive)
}

/// Read member `index` as f32, narrowing float64 members.
fn read_npz_member<R: Read + Seek>(npz: &mut NpzReader<R>, index: usize) -> Result<ArrayD<f32>> {
    match npz.by_index::<OwnedRepr<f32>, IxDyn>(index) {
        Ok(array) => Ok(array),
        Err(f32_err) => match npz.by_index::<OwnedRepr<f64>, IxDyn>(index) {
            Ok(array) => Ok(array.mapv(|v| v as f32)),
            Err(_) => Err(f32_err.into()),
        },
    }
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema:
///
/// ```json
/// {
///   "apple_s01_0001": [[0.1, 0.2], [0.3, 0.4]],
///   "pear_s02_0002":  [[0.5, 0.6]]
/// }
/// ```
fn read_json(path: &Path) -> Result<Archive> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let object = root.as_object().context("Expected top-level JSON object")?;

    object
        .iter()
        .map(|(key, value)| Ok((key.clone(), json_to_array(key, value)?)))
        .collect()
}

fn json_to_array(key: &str, value: &JsonValue) -> Result<ArrayD<f32>> {
    // Shape follows the first element at every nesting level.
    let mut shape = Vec::new();
    let mut cur = value;
    while let JsonValue::Array(arr) = cur {
        shape.push(arr.len());
        match arr.first() {
            Some(first) => cur = first,
            None => break,
        }
    }

    let mut flat = Vec::with_capacity(shape.iter().product());
    flatten_json(key, value, &shape, &mut flat)?;
    ArrayD::from_shape_vec(IxDyn(&shape), flat)
        .with_context(|| format!("Key '{key}': shape {shape:?}"))
}

fn flatten_json(key: &str, value: &JsonValue, shape: &[usize], out: &mut Vec<f32>) -> Result<()> {
    match (value, shape.split_first()) {
        (JsonValue::Array(arr), Some((&n, rest))) if arr.len() == n => {
            for v in arr {
                flatten_json(key, v, rest, out)?;
            }
            Ok(())
        }
        (JsonValue::Number(num), None) => {
            let v = num
                .as_f64()
                .with_context(|| format!("Key '{key}': {num} is not a number"))?;
            out.push(v as f32);
            Ok(())
        }
        (JsonValue::Number(_), Some(_)) | (JsonValue::Array(_), _) => {
            Err(DataError::Ragged(key.to_string()).into())
        }
        (other, _) => bail!("Key '{key}': unexpected JSON value {other}"),
    }
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet archive.
///
/// Expected schema:
/// - `key`: Utf8
/// - `frames`: List<List<Float32|Float64>> for `(time, dim)` samples, or
///   List<Float32|Float64> for fixed-dimensional vectors
fn read_parquet(path: &Path) -> Result<Archive> {
    let file = File::open(path).context("opening parquet file")?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut archive = Archive::new();

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();

        let key_idx = schema
            .index_of("key")
            .map_err(|_| anyhow::anyhow!("Parquet file missing 'key' column"))?;
        let frames_idx = schema
            .index_of("frames")
            .map_err(|_| anyhow::anyhow!("Parquet file missing 'frames' column"))?;

        let keys = batch
            .column(key_idx)
            .as_any()
            .downcast_ref::<StringArray>()
            .context("'key' column must be Utf8")?;
        let frames = batch.column(frames_idx);

        for row in 0..batch.num_rows() {
            if keys.is_null(row) {
                bail!("Row {row}: null key");
            }
            let key = keys.value(row).to_string();
            let array = extract_frames(frames, row, &key)
                .with_context(|| format!("Row {row} ('{key}'): failed to read 'frames'"))?;
            insert_unique(&mut archive, key, array)?;
        }
    }

    Ok(archive)
}

// -- Parquet / Arrow helpers --

fn extract_frames(col: &ArrayRef, row: usize, key: &str) -> Result<ArrayD<f32>> {
    let values = list_value(col, row)?;
    match values.data_type() {
        DataType::List(_) | DataType::LargeList(_) => {
            let n_rows = values.len();
            let mut flat = Vec::new();
            let mut d_frame = None;
            for r in 0..n_rows {
                let frame = float_values(&list_value(&values, r)?)?;
                match d_frame {
                    None => d_frame = Some(frame.len()),
                    Some(d) if d != frame.len() => {
                        return Err(DataError::Ragged(key.to_string()).into())
                    }
                    Some(_) => {}
                }
                flat.extend(frame);
            }
            Ok(ArrayD::from_shape_vec(
                IxDyn(&[n_rows, d_frame.unwrap_or(0)]),
                flat,
            )?)
        }
        _ => {
            let frame = float_values(&values)?;
            let n = frame.len();
            Ok(ArrayD::from_shape_vec(IxDyn(&[n]), frame)?)
        }
    }
}

/// The row `row` of a List or LargeList column.
fn list_value(col: &ArrayRef, row: usize) -> Result<ArrayRef> {
    if col.is_null(row) {
        bail!("null value in list column");
    }
    match col.data_type() {
        DataType::List(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<ListArray>()
                .context("expected ListArray")?;
            Ok(list_arr.value(row))
        }
        DataType::LargeList(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<LargeListArray>()
                .context("expected LargeListArray")?;
            Ok(list_arr.value(row))
        }
        other => bail!("Expected List or LargeList column, got {other:?}"),
    }
}

fn float_values(values: &ArrayRef) -> Result<Vec<f32>> {
    if let Some(f32_arr) = values.as_any().downcast_ref::<Float32Array>() {
        Ok(f32_arr.iter().map(|v| v.unwrap_or(f32::NAN)).collect())
    } else if let Some(f64_arr) = values.as_any().downcast_ref::<Float64Array>() {
        Ok(f64_arr
            .iter()
            .map(|v| v.unwrap_or(f64::NAN) as f32)
            .collect())
    } else {
        bail!(
            "List inner type is {:?}, expected Float32 or Float64",
            values.data_type()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};
    use std::sync::Arc;

    use arrow::array::{Float32Builder, ListBuilder};
    use arrow::record_batch::RecordBatch;
    use ndarray_npy::NpzWriter;
    use parquet::arrow::ArrowWriter;
    use tempfile::TempDir;

    fn write_npz(dir: &TempDir, name: &str, members: &[(&str, Array2<f32>)]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut npz = NpzWriter::new(File::create(&path).unwrap());
        for (key, arr) in members {
            npz.add_array(*key, arr).unwrap();
        }
        npz.finish().unwrap();
        path
    }

    fn write_parquet(dir: &TempDir, name: &str, columns: Vec<(&str, ArrayRef)>) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let batch = RecordBatch::try_from_iter(columns).unwrap();
        let mut writer = ArrowWriter::try_new(File::create(&path).unwrap(), batch.schema(), None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();
        path
    }

    /// `List<Float32>` column with one vector per row.
    fn vectors(rows: &[&[f32]]) -> ArrayRef {
        let mut builder = ListBuilder::new(Float32Builder::new());
        for row in rows {
            builder.values().append_slice(row);
            builder.append(true);
        }
        Arc::new(builder.finish())
    }

    #[test]
    fn npz_items_come_back_sorted() {
        let dir = TempDir::new().unwrap();
        let path = write_npz(
            &dir,
            "feats.npz",
            &[
                ("zebra_s2_1", Array2::zeros((3, 2))),
                ("apple_s1_1", Array2::ones((5, 2))),
                ("mango_s1_2", Array2::zeros((4, 2))),
            ],
        );

        let ds = load_dataset(&path, None).unwrap();
        assert_eq!(ds.keys(), vec!["apple_s1_1", "mango_s1_2", "zebra_s2_1"]);
        assert_eq!(ds.labels(), vec!["apple", "mango", "zebra"]);
        assert_eq!(ds.speakers(), vec!["s1", "s1", "s2"]);
        assert_eq!(ds.lengths(), vec![5, 4, 3]);
        assert_eq!(ds.items[0].sample, Array2::<f32>::ones((5, 2)));
    }

    #[test]
    fn min_length_boundary_is_strict() {
        let dir = TempDir::new().unwrap();
        let path = write_npz(
            &dir,
            "feats.npz",
            &[
                ("a_s1_1", Array2::zeros((3, 1))),
                ("b_s1_1", Array2::zeros((4, 1))),
            ],
        );

        let ds = load_dataset(&path, Some(3)).unwrap();
        assert_eq!(ds.keys(), vec!["b_s1_1"]);
    }

    #[test]
    fn float64_members_are_narrowed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f64.npz");
        let mut npz = NpzWriter::new(File::create(&path).unwrap());
        npz.add_array("w_s_0", &array![[1.5f64, 2.0], [3.0, 4.0]]).unwrap();
        npz.finish().unwrap();

        let ds = load_dataset(&path, None).unwrap();
        assert_eq!(ds.items[0].sample, array![[1.5f32, 2.0], [3.0, 4.0]]);
    }

    #[test]
    fn empty_archive_is_an_empty_dataset() {
        let dir = TempDir::new().unwrap();
        let path = write_npz(&dir, "empty.npz", &[]);
        let ds = load_dataset(&path, None).unwrap();
        assert!(ds.is_empty());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(load_dataset(&dir.path().join("nope.npz"), None).is_err());
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = read_archive(Path::new("feats.h5")).unwrap_err();
        assert!(err.to_string().contains("Unsupported archive extension"));
    }

    #[test]
    fn json_archive_loads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("feats.json");
        std::fs::write(
            &path,
            r#"{"pear_s2_x": [[1, 2], [3, 4], [5, 6]], "fig_s1_y": [[0.5, 0.25]]}"#,
        )
        .unwrap();

        let ds = load_dataset(&path, None).unwrap();
        assert_eq!(ds.keys(), vec!["fig_s1_y", "pear_s2_x"]);
        assert_eq!(ds.items[1].sample, array![[1.0f32, 2.0], [3.0, 4.0], [5.0, 6.0]]);
    }

    #[test]
    fn ragged_json_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ragged.json");
        std::fs::write(&path, r#"{"a_s_1": [[1, 2], [3]]}"#).unwrap();

        let err = read_archive(&path).unwrap_err();
        assert_eq!(
            err.downcast_ref::<DataError>(),
            Some(&DataError::Ragged("a_s_1".into()))
        );
    }

    #[test]
    fn malformed_key_fails_load() {
        let dir = TempDir::new().unwrap();
        let path = write_npz(&dir, "bad.npz", &[("nokey", Array2::zeros((2, 2)))]);
        let err = load_dataset(&path, None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DataError>(),
            Some(DataError::MalformedKey(_))
        ));
    }

    #[test]
    fn embeddings_load_as_matrix() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("embeds.npz");
        let mut npz = NpzWriter::new(File::create(&path).unwrap());
        npz.add_array("b_s2_1", &Array1::from(vec![3.0f32, 4.0])).unwrap();
        npz.add_array("a_s1_1", &Array1::from(vec![1.0f32, 2.0])).unwrap();
        npz.finish().unwrap();

        let emb = load_embeddings(&path).unwrap();
        assert_eq!(emb.labels, vec!["a", "b"]);
        assert_eq!(emb.speakers, vec!["s1", "s2"]);
        assert_eq!(emb.matrix, array![[1.0f32, 2.0], [3.0, 4.0]]);
    }

    #[test]
    fn parquet_flat_frames_load_as_embeddings() {
        let dir = TempDir::new().unwrap();
        let keys: ArrayRef = Arc::new(StringArray::from(vec!["b_s2_1", "a_s1_1"]));
        let path = write_parquet(
            &dir,
            "embeds.parquet",
            vec![("key", keys), ("frames", vectors(&[&[3.0, 4.0], &[1.0, 2.0]]))],
        );

        let emb = load_embeddings(&path).unwrap();
        assert_eq!(emb.keys, vec!["a_s1_1", "b_s2_1"]);
        assert_eq!(emb.matrix, array![[1.0f32, 2.0], [3.0, 4.0]]);
    }

    #[test]
    fn null_parquet_key_is_rejected() {
        let dir = TempDir::new().unwrap();
        let keys: ArrayRef = Arc::new(StringArray::from(vec![Some("a_s1_1"), None]));
        let path = write_parquet(
            &dir,
            "nullkey.parquet",
            vec![("key", keys), ("frames", vectors(&[&[1.0], &[2.0]]))],
        );

        let err = read_archive(&path).unwrap_err();
        assert!(err.to_string().contains("Row 1: null key"));
    }

    #[test]
    fn parquet_without_frames_column_is_rejected() {
        let dir = TempDir::new().unwrap();
        let keys: ArrayRef = Arc::new(StringArray::from(vec!["a_s1_1"]));
        let path = write_parquet(&dir, "keys.parquet", vec![("key", keys)]);

        let err = read_archive(&path).unwrap_err();
        assert!(err.to_string().contains("missing 'frames' column"));
    }

    #[test]
    fn embeddings_must_share_dimension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("embeds.json");
        std::fs::write(&path, r#"{"a_s_1": [1, 2], "b_s_1": [1, 2, 3]}"#).unwrap();

        let err = load_embeddings(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DataError>(),
            Some(DataError::FeatureDim { index: 1, expected: 2, found: 3 })
        ));
    }
}
