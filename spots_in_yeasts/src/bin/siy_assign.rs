//! siy_assign
#![deny(missing_docs)]

use anyhow::{Context, Result};
use docopt::Docopt;
use log::info;
use ndarray::Array2;
use ndarray_npy::{ReadNpyExt, WriteNpyExt};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use spots_in_yeasts::{
    assign_field, measure_spots, outlines, random_color_lut, spot_uniformity, spots_by_cell,
    AssignConfig, FieldAssignment, FieldLabels, Label, Uniformity,
};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

const USAGE: &str = "
Assign spots to nuclei and nuclei to cells in one field of view.

Usage:
  siy_assign --cells=<npy> --nuclei=<npy> --spots=<npy> --out=<dir> [options]
  siy_assign --help

Options:
     --fluo=<npy>      Spot fluorescence image (float32) for mean intensities.
     --params=<toml>   Parameters file. Defaults are used for missing keys.
     --seed=<n>        Seed of the random cell colors [default: 1].
     --outline=<px>    Thickness of the cell outlines [default: 1].
     --help            Show this screen.
";

#[derive(Deserialize)]
struct Args {
    flag_cells: PathBuf,
    flag_nuclei: PathBuf,
    flag_spots: PathBuf,
    flag_out: PathBuf,
    flag_fluo: Option<PathBuf>,
    flag_params: Option<PathBuf>,
    flag_seed: u64,
    flag_outline: usize,
}

#[derive(Serialize)]
struct Report<'a> {
    #[serde(flatten)]
    assignment: &'a FieldAssignment,
    uniformity: Option<Uniformity>,
    spots_per_cell: Vec<(Label, usize)>,
}

fn read_labels(path: &Path) -> Result<Array2<Label>> {
    let file = File::open(path).with_context(|| path.display().to_string())?;
    Array2::<Label>::read_npy(file).with_context(|| path.display().to_string())
}

fn write_npy<T: ndarray_npy::WritableElement>(path: &Path, array: &Array2<T>) -> Result<()> {
    let writer = BufWriter::new(File::create(path).with_context(|| path.display().to_string())?);
    array
        .write_npy(writer)
        .with_context(|| path.display().to_string())
}

fn main() -> Result<()> {
    env_logger::init();
    let args: Args = Docopt::new(USAGE)
        .and_then(|d| d.deserialize())
        .unwrap_or_else(|e| e.exit());

    let config = match &args.flag_params {
        Some(path) => AssignConfig::load(path)?,
        None => AssignConfig::default(),
    };
    let spots = read_labels(&args.flag_spots)?;
    let nuclei = read_labels(&args.flag_nuclei)?;
    let cells = read_labels(&args.flag_cells)?;
    let fluo = args
        .flag_fluo
        .as_deref()
        .map(|path| -> Result<Array2<f32>> {
            let file = File::open(path).with_context(|| path.display().to_string())?;
            Array2::<f32>::read_npy(file).with_context(|| path.display().to_string())
        })
        .transpose()?;

    let labels = FieldLabels::new(spots.view(), nuclei.view(), cells.view());
    let assignment = assign_field(&labels, &config)?;
    let measurements = measure_spots(&labels, &assignment, fluo.as_ref().map(Array2::view))?;
    let points: Vec<_> = measurements
        .iter()
        .map(|m| (m.centroid_row, m.centroid_col))
        .collect();
    let uniformity = spot_uniformity(&points, cells.dim(), config.uniformity_grid);
    if let Some(u) = &uniformity {
        info!(
            "spot uniformity: chi2 = {:.2}, dof = {}, p = {:.3e}",
            u.chi_squared, u.degrees_of_freedom, u.p_value
        );
    }

    let out = &args.flag_out;
    std::fs::create_dir_all(out).with_context(|| out.display().to_string())?;
    write_npy(&out.join("spots_relabeled.npy"), &assignment.relabeled.spots)?;
    write_npy(&out.join("nuclei_relabeled.npy"), &assignment.relabeled.nuclei)?;
    write_npy(&out.join("cells_relabeled.npy"), &assignment.relabeled.cells)?;
    write_npy(
        &out.join("cell_outlines.npy"),
        &outlines(assignment.relabeled.cells.view(), args.flag_outline),
    )?;

    let slots = assignment.luts.cells.kept().count() + 1;
    let colors = random_color_lut(&mut SmallRng::seed_from_u64(args.flag_seed), slots);
    let path = out.join("cell_colors.json");
    serde_json::to_writer(BufWriter::new(File::create(&path)?), &colors)
        .with_context(|| path.display().to_string())?;

    let report = Report {
        assignment: &assignment,
        uniformity,
        spots_per_cell: spots_by_cell(&assignment, &measurements)
            .into_iter()
            .map(|(cell, spots)| (cell, spots.len()))
            .collect(),
    };
    let path = out.join("assignment.json");
    serde_json::to_writer_pretty(BufWriter::new(File::create(&path)?), &report)
        .with_context(|| path.display().to_string())?;

    let path = out.join("spots.csv");
    let mut writer = csv::Writer::from_path(&path).with_context(|| path.display().to_string())?;
    for m in &measurements {
        writer.serialize(m)?;
    }
    writer.flush()?;

    info!(
        "{} spots assigned, outputs in {}",
        assignment.associations.len(),
        out.display()
    );
    Ok(())
}
