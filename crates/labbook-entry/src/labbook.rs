//! The irradiation labbook: a PDF listing every level and persisted position
//! of a set of irradiations.
//!
//! Collection and rendering are separate steps. [`collect_labbook`] reads
//! the stores into a [`Labbook`], stepping the progress callback once per
//! level; [`render_pdf`] lays that out on A4 pages.

use std::fs;
use std::path::Path;

use printpdf::{
    BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference,
};
use tracing::{debug, info};

use labbook_storage::{IrradiationFilter, MetaRepository, NameOrder, RecordStore, StorageError};

use crate::error::EntryError;
use crate::session::Progress;

/// One position row of the labbook.
#[derive(Debug, Clone, PartialEq)]
pub struct LabbookRow {
    pub hole: u32,
    pub identifier: String,
    pub sample: String,
    pub material: String,
    pub project: String,
    pub j: f64,
    pub j_err: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabbookLevel {
    pub name: String,
    pub holder: Option<String>,
    pub z: Option<f64>,
    pub note: String,
    pub rows: Vec<LabbookRow>,
}

impl LabbookLevel {
    /// Level heading as printed, e.g. `Level A  Holder 24Spokes  z 10`.
    pub fn heading(&self) -> String {
        let mut heading = format!("Level {}", self.name);
        if let Some(holder) = &self.holder {
            heading.push_str(&format!("  Holder {holder}"));
        }
        if let Some(z) = self.z {
            heading.push_str(&format!("  z {z}"));
        }
        if !self.note.is_empty() {
            heading.push_str(&format!("  {}", self.note));
        }
        heading
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabbookIrradiation {
    pub name: String,
    pub levels: Vec<LabbookLevel>,
}

/// Irradiations in ascending name order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Labbook {
    pub irradiations: Vec<LabbookIrradiation>,
}

impl Labbook {
    pub fn level_count(&self) -> usize {
        self.irradiations.iter().map(|i| i.levels.len()).sum()
    }
}

/// Reads the named irradiations into a [`Labbook`]. Every name must exist.
pub fn collect_labbook<S, M>(
    store: &S,
    meta: &M,
    names: &[String],
    progress: &mut dyn Progress,
) -> Result<Labbook, EntryError>
where
    S: RecordStore + ?Sized,
    M: MetaRepository + ?Sized,
{
    let irradiations = store.get_irradiations(&IrradiationFilter {
        names: Some(names.to_vec()),
        order: Some(NameOrder::Asc),
        ..Default::default()
    })?;
    if let Some(missing) = names
        .iter()
        .find(|n| !irradiations.iter().any(|i| &i.name == *n))
    {
        return Err(StorageError::IrradiationNotFound(missing.clone()).into());
    }

    let levels = irradiations
        .iter()
        .map(|i| store.get_levels(&i.name).map(|levels| (i.name.clone(), levels)))
        .collect::<Result<Vec<_>, _>>()?;
    let total: usize = levels.iter().map(|(_, l)| l.len()).sum();
    info!(irradiations = levels.len(), levels = total, "collecting labbook");

    let mut labbook = Labbook::default();
    let mut done = 0;
    for (irradiation, levels) in levels {
        let mut entry = LabbookIrradiation {
            name: irradiation.clone(),
            levels: Vec::with_capacity(levels.len()),
        };
        for level in levels {
            let mut rows = Vec::new();
            for detail in store.get_level_positions(&irradiation, &level.name)? {
                let hole = detail.position.position;
                let flux = meta.get_flux(&irradiation, &level.name, hole)?;
                rows.push(LabbookRow {
                    hole,
                    identifier: detail.position.identifier.clone().unwrap_or_default(),
                    sample: detail.sample.clone().unwrap_or_default(),
                    material: detail.material.clone().unwrap_or_default(),
                    project: detail.project.clone().unwrap_or_default(),
                    j: flux.map_or(0.0, |f| f.value),
                    j_err: flux.map_or(0.0, |f| f.error),
                    weight: detail.position.weight,
                });
            }
            done += 1;
            progress.step(done, total, &format!("{irradiation}{}", level.name));
            debug!(
                irradiation = %irradiation,
                level = %level.name,
                rows = rows.len(),
                "level collected"
            );
            entry.levels.push(LabbookLevel {
                name: level.name,
                holder: level.holder,
                z: level.z,
                note: level.note,
                rows,
            });
        }
        labbook.irradiations.push(entry);
    }
    Ok(labbook)
}

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 15.0;
const LINE: f32 = 5.0;
const TITLE_SIZE: f32 = 14.0;
const HEADING_SIZE: f32 = 11.0;
const BODY_SIZE: f32 = 8.0;

/// Left edge of each table column, in mm.
const COLUMNS: [(f32, &str); 8] = [
    (MARGIN, "Hole"),
    (MARGIN + 12.0, "L#"),
    (MARGIN + 32.0, "Sample"),
    (MARGIN + 62.0, "Material"),
    (MARGIN + 87.0, "Project"),
    (MARGIN + 120.0, "J"),
    (MARGIN + 142.0, "J err"),
    (MARGIN + 164.0, "Weight"),
];

/// Table cells of one row, in [`COLUMNS`] order.
pub fn row_cells(row: &LabbookRow) -> [String; 8] {
    [
        row.hole.to_string(),
        row.identifier.clone(),
        row.sample.clone(),
        row.material.clone(),
        row.project.clone(),
        format!("{:.4e}", row.j),
        format!("{:.2e}", row.j_err),
        format!("{:.3}", row.weight),
    ]
}

fn pdf_error(e: impl std::fmt::Display) -> EntryError {
    EntryError::Report(e.to_string())
}

/// Writes text top-down, starting a new page when the current one is full.
struct PageWriter {
    doc: PdfDocumentReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    layer: PdfLayerReference,
    y: f32,
    pages: usize,
}

impl PageWriter {
    fn new(title: &str) -> Result<Self, EntryError> {
        let (doc, page, layer) =
            PdfDocument::new(title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "labbook");
        let regular = doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_error)?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(pdf_error)?;
        let layer = doc.get_page(page).get_layer(layer);
        Ok(PageWriter {
            doc,
            regular,
            bold,
            layer,
            y: PAGE_HEIGHT - MARGIN,
            pages: 1,
        })
    }

    fn new_page(&mut self) {
        let (page, layer) = self
            .doc
            .add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "labbook");
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.y = PAGE_HEIGHT - MARGIN;
        self.pages += 1;
    }

    /// Moves down by `height`, breaking the page first if it does not fit.
    fn advance(&mut self, height: f32) {
        if self.y - height < MARGIN {
            self.new_page();
        }
        self.y -= height;
    }

    fn text(&self, x: f32, text: &str, size: f32, bold: bool) {
        let font = if bold { &self.bold } else { &self.regular };
        self.layer.use_text(text, size, Mm(x), Mm(self.y), font);
    }

    fn cells(&mut self, cells: &[String], bold: bool) {
        self.advance(LINE);
        for ((x, _), cell) in COLUMNS.iter().zip(cells) {
            self.text(*x, cell, BODY_SIZE, bold);
        }
    }

    fn finish(self) -> Result<Vec<u8>, EntryError> {
        self.doc.save_to_bytes().map_err(pdf_error)
    }
}

/// Renders the labbook. Each irradiation starts on a new page.
pub fn render_pdf(labbook: &Labbook) -> Result<Vec<u8>, EntryError> {
    let mut writer = PageWriter::new("Irradiation Labbook")?;
    let header: Vec<String> = COLUMNS.iter().map(|(_, h)| h.to_string()).collect();

    for (i, irradiation) in labbook.irradiations.iter().enumerate() {
        if i > 0 {
            writer.new_page();
        }
        writer.advance(LINE * 1.5);
        writer.text(MARGIN, &format!("Irradiation {}", irradiation.name), TITLE_SIZE, true);

        for level in &irradiation.levels {
            writer.advance(LINE * 2.0);
            writer.text(MARGIN, &level.heading(), HEADING_SIZE, true);
            writer.cells(&header, true);
            for row in &level.rows {
                writer.cells(&row_cells(row), false);
            }
        }
    }

    debug!(pages = writer.pages, "rendered labbook");
    writer.finish()
}

/// Renders the labbook and writes it to `path`.
pub fn write_pdf(labbook: &Labbook, path: &Path) -> Result<(), EntryError> {
    let bytes = render_pdf(labbook)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes)?;
    info!(path = %path.display(), "wrote labbook");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use labbook_core::FluxValue;
    use labbook_storage::{FsMetaRepository, InMemoryStore, PositionUpdate};

    struct Steps(Vec<(usize, usize, String)>);

    impl Progress for Steps {
        fn step(&mut self, done: usize, total: usize, message: &str) {
            self.0.push((done, total, message.to_string()));
        }
    }

    fn populated(dir: &Path) -> (InMemoryStore, FsMetaRepository) {
        let mut store = InMemoryStore::new();
        let mut meta = FsMetaRepository::new(dir);
        for name in ["NM-2", "NM-1"] {
            store.add_irradiation(name).unwrap();
            store
                .add_irradiation_level(name, "A", Some("24Spokes"), Some(10.0), "")
                .unwrap();
        }
        store
            .add_irradiation_level("NM-1", "B", None, None, "top")
            .unwrap();
        store.add_project("Rift", None).unwrap();
        let sample = store.add_sample("S1", "Rift", Some("sanidine")).unwrap();
        let p = store.add_irradiation_position("NM-1", "A", 3).unwrap();
        store
            .update_position(
                p.id,
                &PositionUpdate {
                    identifier: Some("1000".into()),
                    sample: Some(sample.id),
                    weight: Some(1.25),
                    ..Default::default()
                },
            )
            .unwrap();
        store.commit().unwrap();
        meta.update_flux("NM-1", "A", 3, "1000", FluxValue::new(0.002, 0.00001).unwrap())
            .unwrap();
        (store, meta)
    }

    #[test]
    fn collects_in_name_order_with_one_step_per_level() {
        let dir = tempfile::tempdir().unwrap();
        let (store, meta) = populated(dir.path());
        let mut steps = Steps(Vec::new());
        let names = vec!["NM-2".to_string(), "NM-1".to_string()];
        let labbook = collect_labbook(&store, &meta, &names, &mut steps).unwrap();

        let order: Vec<&str> = labbook.irradiations.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(order, vec!["NM-1", "NM-2"]);
        assert_eq!(labbook.level_count(), 3);
        let done: Vec<(usize, usize)> = steps.0.iter().map(|(d, t, _)| (*d, *t)).collect();
        assert_eq!(done, vec![(1, 3), (2, 3), (3, 3)]);
        assert_eq!(steps.0[1].2, "NM-1B");

        let row = &labbook.irradiations[0].levels[0].rows[0];
        assert_eq!(row.hole, 3);
        assert_eq!(row.identifier, "1000");
        assert_eq!(row.sample, "S1");
        assert_eq!(row.material, "sanidine");
        assert_eq!(row.project, "Rift");
        assert_eq!(row.j, 0.002);
        assert_eq!(labbook.irradiations[0].levels[0].heading(), "Level A  Holder 24Spokes  z 10");
        assert_eq!(labbook.irradiations[0].levels[1].heading(), "Level B  top");
    }

    #[test]
    fn unknown_irradiation_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let (store, meta) = populated(dir.path());
        let names = vec!["NM-1".to_string(), "NM-9".to_string()];
        let err = collect_labbook(&store, &meta, &names, &mut ()).unwrap_err();
        assert!(matches!(
            err,
            EntryError::Storage(StorageError::IrradiationNotFound(ref name)) if name == "NM-9"
        ));
    }

    #[test]
    fn row_cells_format_numbers() {
        let row = LabbookRow {
            hole: 7,
            identifier: "66000".into(),
            sample: "FC-2".into(),
            material: "sanidine".into(),
            project: "Monitors".into(),
            j: 0.0021,
            j_err: 0.0000021,
            weight: 1.5,
        };
        let cells = row_cells(&row);
        assert_eq!(cells[0], "7");
        assert_eq!(cells[5], "2.1000e-3");
        assert_eq!(cells[6], "2.10e-6");
        assert_eq!(cells[7], "1.500");
    }

    #[test]
    fn renders_a_pdf_spanning_pages() {
        let level = LabbookLevel {
            name: "A".into(),
            holder: None,
            z: None,
            note: String::new(),
            rows: (1..=120)
                .map(|hole| LabbookRow {
                    hole,
                    identifier: format!("{}", 66000 + hole),
                    sample: "S1".into(),
                    material: "sanidine".into(),
                    project: "Rift".into(),
                    j: 0.002,
                    j_err: 0.000002,
                    weight: 0.0,
                })
                .collect(),
        };
        let labbook = Labbook {
            irradiations: vec![LabbookIrradiation {
                name: "NM-1".into(),
                levels: vec![level],
            }],
        };
        let bytes = render_pdf(&labbook).unwrap();
        assert!(bytes.starts_with(b"%PDF"));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("labbook.pdf");
        write_pdf(&labbook, &path).unwrap();
        assert!(fs::read(&path).unwrap().starts_with(b"%PDF"));
    }
}
