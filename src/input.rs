//! Common routines for handling input data.
use crate::id::{HasID, IDLike, check_id_format};
use crate::model::{Model, ModelParameters};
use crate::units::Dimensionless;
use anyhow::{Context, Result, ensure};
use float_cmp::approx_eq;
use indexmap::IndexMap;
use itertools::Itertools;
use serde::de::{Deserialize, DeserializeOwned, Deserializer};
use std::borrow::Borrow;
use std::fs;
use std::path::Path;

mod agent;
use agent::build_agents;
mod demand;
use demand::read_demand;
mod link;
use link::read_topology;
mod region;
use region::read_regions;
mod technology;
use technology::read_technologies;
mod time_slice;
use time_slice::read_time_slice_info;

/// Read a series of type `T`s from a CSV file.
///
/// Will raise an error if the file is empty.
///
/// # Arguments
///
/// * `file_path` - Path to the CSV file
pub fn read_csv<'a, T: DeserializeOwned + 'a>(
    file_path: &'a Path,
) -> Result<impl Iterator<Item = T> + 'a> {
    let vec = read_csv_internal(file_path)?;
    ensure!(!vec.is_empty(), "CSV file {} cannot be empty", file_path.display());

    Ok(vec.into_iter())
}

/// Read a series of type `T`s from a CSV file.
///
/// The file may be empty or missing, in which case the iterator is empty.
pub fn read_csv_optional<'a, T: DeserializeOwned + 'a>(
    file_path: &'a Path,
) -> Result<impl Iterator<Item = T> + 'a> {
    if !file_path.exists() {
        return Ok(Vec::new().into_iter());
    }

    Ok(read_csv_internal(file_path)?.into_iter())
}

fn read_csv_internal<T: DeserializeOwned>(file_path: &Path) -> Result<Vec<T>> {
    let vec = csv::Reader::from_path(file_path)
        .with_context(|| input_err_msg(file_path))?
        .into_deserialize()
        .process_results(|iter| iter.collect_vec())
        .with_context(|| input_err_msg(file_path))?;

    Ok(vec)
}

/// Parse a TOML file at the specified path.
///
/// # Arguments
///
/// * `file_path` - Path to the TOML file
///
/// # Returns
///
/// * The deserialised TOML data or an error if the file could not be read or parsed.
pub fn read_toml<T: DeserializeOwned>(file_path: &Path) -> Result<T> {
    let toml_str = fs::read_to_string(file_path).with_context(|| input_err_msg(file_path))?;
    let toml_data = toml::from_str(&toml_str).with_context(|| input_err_msg(file_path))?;

    Ok(toml_data)
}

/// Read a `Dimensionless` float, checking that it is between 0 and 1 and not zero
pub fn deserialise_proportion_nonzero<'de, D>(deserialiser: D) -> Result<Dimensionless, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserialiser)?;
    if !(value > 0.0 && value <= 1.0) {
        Err(serde::de::Error::custom("Value must be > 0 and <= 1"))?;
    }

    Ok(Dimensionless(value))
}

/// Format an error message to include the file path. To be used with `anyhow::Context`.
pub fn input_err_msg<P: AsRef<Path>>(file_path: P) -> String {
    format!("Error reading {}", file_path.as_ref().display())
}

/// Read a CSV file of items with IDs.
///
/// As this function is only ever used for top-level CSV files (i.e. the ones which actually define
/// the IDs for a given type), we use an ordered map to maintain the order in the input files.
fn read_csv_id_file<T, ID: IDLike>(file_path: &Path) -> Result<IndexMap<ID, T>>
where
    T: HasID<ID> + DeserializeOwned,
{
    fn fill_and_validate_map<T, ID: IDLike>(file_path: &Path) -> Result<IndexMap<ID, T>>
    where
        T: HasID<ID> + DeserializeOwned,
    {
        let mut map = IndexMap::new();
        for record in read_csv::<T>(file_path)? {
            let id = record.get_id().clone();
            check_id_format(Borrow::<str>::borrow(&id))?;
            let existing = map.insert(id.clone(), record).is_some();
            ensure!(!existing, "Duplicate ID found: {id}");
        }

        Ok(map)
    }

    fill_and_validate_map(file_path).with_context(|| input_err_msg(file_path))
}

/// Check that fractions sum to (approximately) one
pub fn check_values_sum_to_one_approx<I>(fractions: I) -> Result<()>
where
    I: Iterator<Item = Dimensionless>,
{
    let sum: Dimensionless = fractions.sum();
    ensure!(
        approx_eq!(Dimensionless, sum, Dimensionless(1.0), epsilon = 1e-5),
        "Sum of fractions does not equal one (actual: {sum})"
    );

    Ok(())
}

/// Check whether an iterator contains values that are sorted and unique
pub fn is_sorted_and_unique<T, I>(iter: I) -> bool
where
    T: PartialOrd + Clone,
    I: IntoIterator<Item = T>,
{
    iter.into_iter().tuple_windows().all(|(a, b)| a < b)
}

/// Read a model from the specified directory.
///
/// # Arguments
///
/// * `model_dir` - Folder containing model configuration files
///
/// # Returns
///
/// The static model data ([`Model`]) or an error.
pub fn load_model<P: AsRef<Path>>(model_dir: P) -> Result<Model> {
    let model_dir = model_dir.as_ref();
    let parameters = ModelParameters::from_path(model_dir)?;
    let time_slice_info = read_time_slice_info(model_dir)?;
    let regions = read_regions(model_dir)?;
    let technologies = read_technologies(
        model_dir,
        &regions,
        &time_slice_info,
        &parameters.milestone_years,
    )?;
    let demand = read_demand(
        model_dir,
        &regions,
        &time_slice_info,
        &parameters.milestone_years,
    )?;
    let agents = build_agents(&regions, &technologies, demand);
    let topology = read_topology(model_dir, &regions)?;

    Ok(Model {
        model_path: model_dir.to_path_buf(),
        parameters,
        time_slice_info,
        regions,
        technologies,
        agents,
        topology,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::GenericID;
    use serde::Deserialize;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[derive(Debug, PartialEq, Deserialize)]
    struct Record {
        id: GenericID,
        value: u32,
    }

    impl HasID<GenericID> for Record {
        fn get_id(&self) -> &GenericID {
            &self.id
        }
    }

    /// Create an example CSV file in dir_path
    fn create_csv_file(dir_path: &Path, contents: &str) -> std::path::PathBuf {
        let file_path = dir_path.join("test.csv");
        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "{contents}").unwrap();
        file_path
    }

    /// Test a normal read
    #[test]
    fn test_read_csv() {
        let dir = tempdir().unwrap();
        let file_path = create_csv_file(dir.path(), "id,value\nhello,1\nworld,2");
        let records: Vec<Record> = read_csv(&file_path).unwrap().collect();
        assert_eq!(
            records,
            &[
                Record {
                    id: "hello".into(),
                    value: 1,
                },
                Record {
                    id: "world".into(),
                    value: 2,
                }
            ]
        );

        // File with no data (only column headers)
        let file_path = create_csv_file(dir.path(), "id,value");
        assert!(read_csv::<Record>(&file_path).is_err());
        assert!(
            read_csv_optional::<Record>(&file_path)
                .unwrap()
                .next()
                .is_none()
        );

        // Missing file
        let missing = dir.path().join("missing.csv");
        assert!(read_csv_optional::<Record>(&missing).unwrap().next().is_none());
    }

    #[test]
    fn test_read_csv_id_file() {
        let dir = tempdir().unwrap();
        let file_path = create_csv_file(dir.path(), "id,value\na,1\nb,2");
        let map: IndexMap<GenericID, Record> = read_csv_id_file(&file_path).unwrap();
        assert_eq!(map.len(), 2);

        let file_path = create_csv_file(dir.path(), "id,value\na,1\na,2");
        assert!(read_csv_id_file::<Record, GenericID>(&file_path).is_err());

        let file_path = create_csv_file(dir.path(), "id,value\na b,1");
        assert!(read_csv_id_file::<Record, GenericID>(&file_path).is_err());
    }

    #[test]
    fn test_read_toml() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Value {
            value: u32,
        }

        let dir = tempdir().unwrap();
        let file_path = dir.path().join("test.toml");
        fs::write(&file_path, "value = 1").unwrap();
        assert_eq!(read_toml::<Value>(&file_path).unwrap(), Value { value: 1 });

        fs::write(&file_path, "bad toml").unwrap();
        assert!(read_toml::<Value>(&file_path).is_err());
    }

    #[test]
    fn test_check_values_sum_to_one_approx() {
        assert!(check_values_sum_to_one_approx([Dimensionless(1.0)].into_iter()).is_ok());
        assert!(
            check_values_sum_to_one_approx([Dimensionless(0.4), Dimensionless(0.6)].into_iter())
                .is_ok()
        );
        assert!(check_values_sum_to_one_approx([Dimensionless(0.5)].into_iter()).is_err());
        assert!(check_values_sum_to_one_approx(std::iter::empty()).is_err());
    }

    #[test]
    fn test_is_sorted_and_unique() {
        assert!(is_sorted_and_unique([1, 2, 3]));
        assert!(is_sorted_and_unique::<u32, _>([]));
        assert!(!is_sorted_and_unique([1, 1]));
        assert!(!is_sorted_and_unique([2, 1]));
    }

    #[test]
    fn test_load_demo_model() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos").join("two_regions");
        let model = load_model(dir).unwrap();
        assert_eq!(model.agents.len(), 2);
        assert!(!model.topology.is_empty());
    }
}
