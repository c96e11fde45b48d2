//! SQLite implementation of [`RecordStore`].
//!
//! [`SqliteStore`] persists labbook records in a SQLite database with WAL
//! mode and automatic schema migrations. The first mutation after a commit
//! opens a transaction; [`RecordStore::commit`] and
//! [`RecordStore::rollback`] close it. Reads on the same connection see
//! staged changes.

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::debug;

use labbook_core::records::{
    Analysis, Irradiation, IrradiationPosition, Level, MassSpectrometer, Material, Project, Sample,
};
use labbook_core::{
    AnalysisId, IrradiationId, LevelId, MassSpectrometerId, MaterialId, PositionId, ProjectId,
    SampleId,
};

use crate::error::StorageError;
use crate::traits::RecordStore;
use crate::types::{
    at_most_one, IrradiationFilter, NameOrder, PositionDetail, PositionUpdate, SampleFilter,
};

const POSITION_COLUMNS: &str = "p.id, p.level_id, p.position, p.identifier, p.sample_id, p.weight, p.note";

const DETAIL_SELECT: &str = "SELECT p.id, p.level_id, p.position, p.identifier, p.sample_id, p.weight, p.note, \
     i.name, l.name, s.name, m.name, m.grainsize, pr.name, pr.principal_investigator, s.igsn, \
     (SELECT COUNT(*) FROM analyses a WHERE a.position_id = p.id) \
     FROM irradiation_positions p \
     JOIN levels l ON l.id = p.level_id \
     JOIN irradiations i ON i.id = l.irradiation_id \
     LEFT JOIN samples s ON s.id = p.sample_id \
     LEFT JOIN materials m ON m.id = s.material_id \
     LEFT JOIN projects pr ON pr.id = s.project_id";

/// SQLite-backed implementation of [`RecordStore`].
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens (or creates) a SQLite database at `path`.
    pub fn new(path: &str) -> Result<Self, StorageError> {
        let conn = crate::schema::open_database(path)?;
        Ok(SqliteStore { conn })
    }

    /// Opens an in-memory SQLite database (for testing).
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = crate::schema::open_in_memory()?;
        Ok(SqliteStore { conn })
    }

    /// True while changes are staged but not committed.
    pub fn has_pending_changes(&self) -> bool {
        !self.conn.is_autocommit()
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    /// Opens a transaction unless one is already open.
    fn stage(&self) -> Result<(), StorageError> {
        if self.conn.is_autocommit() {
            self.conn.execute_batch("BEGIN")?;
        }
        Ok(())
    }

    /// Runs a natural-key query and reduces it to at most one row.
    fn query_unique<T, P, F>(
        &self,
        table: &'static str,
        name: &str,
        sql: &str,
        params: P,
        map: F,
    ) -> Result<Option<T>, StorageError>
    where
        P: rusqlite::Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let rows = stmt
            .query_map(params, map)?
            .collect::<Result<Vec<_>, _>>()?;
        at_most_one(table, name, rows)
    }

    fn query_all<T, P, F>(&self, sql: &str, params: P, map: F) -> Result<Vec<T>, StorageError>
    where
        P: rusqlite::Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, map)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
        Ok(Project {
            id: ProjectId(row.get(0)?),
            name: row.get(1)?,
            principal_investigator: row.get(2)?,
        })
    }

    fn material_from_row(row: &Row<'_>) -> rusqlite::Result<Material> {
        Ok(Material {
            id: MaterialId(row.get(0)?),
            name: row.get(1)?,
            grainsize: row.get(2)?,
        })
    }

    fn sample_from_row(row: &Row<'_>) -> rusqlite::Result<Sample> {
        let material: Option<i64> = row.get(3)?;
        Ok(Sample {
            id: SampleId(row.get(0)?),
            name: row.get(1)?,
            project: ProjectId(row.get(2)?),
            material: material.map(MaterialId),
            igsn: row.get(4)?,
        })
    }

    fn level_from_row(row: &Row<'_>) -> rusqlite::Result<Level> {
        Ok(Level {
            id: LevelId(row.get(0)?),
            irradiation: IrradiationId(row.get(1)?),
            name: row.get(2)?,
            holder: row.get(3)?,
            z: row.get(4)?,
            note: row.get(5)?,
        })
    }

    fn position_from_row(row: &Row<'_>) -> rusqlite::Result<IrradiationPosition> {
        let sample: Option<i64> = row.get(4)?;
        Ok(IrradiationPosition {
            id: PositionId(row.get(0)?),
            level: LevelId(row.get(1)?),
            position: row.get(2)?,
            identifier: row.get(3)?,
            sample: sample.map(SampleId),
            weight: row.get(5)?,
            note: row.get(6)?,
        })
    }

    fn detail_from_row(row: &Row<'_>) -> rusqlite::Result<PositionDetail> {
        Ok(PositionDetail {
            position: Self::position_from_row(row)?,
            irradiation: row.get(7)?,
            level: row.get(8)?,
            sample: row.get(9)?,
            material: row.get(10)?,
            grainsize: row.get(11)?,
            project: row.get(12)?,
            principal_investigator: row.get(13)?,
            igsn: row.get(14)?,
            analysis_count: row.get(15)?,
        })
    }

    /// Resolves a level, failing if the irradiation or level is missing.
    fn require_level(&self, irradiation: &str, level: &str) -> Result<Level, StorageError> {
        if self.get_irradiation(irradiation)?.is_none() {
            return Err(StorageError::IrradiationNotFound(irradiation.to_string()));
        }
        self.get_irradiation_level(irradiation, level)?
            .ok_or_else(|| StorageError::LevelNotFound {
                irradiation: irradiation.to_string(),
                level: level.to_string(),
            })
    }

    fn get_position_by_id(&self, id: PositionId) -> Result<IrradiationPosition, StorageError> {
        let sql = format!("SELECT {POSITION_COLUMNS} FROM irradiation_positions p WHERE p.id = ?1");
        self.conn
            .query_row(&sql, params![id.0], Self::position_from_row)
            .optional()?
            .ok_or(StorageError::PositionNotFound(id.0))
    }
}

impl RecordStore for SqliteStore {
    // -------------------------------------------------------------------
    // Unit of work
    // -------------------------------------------------------------------

    fn commit(&mut self) -> Result<(), StorageError> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StorageError> {
        if !self.conn.is_autocommit() {
            debug!("rolling back staged changes");
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    // -------------------------------------------------------------------
    // Projects and materials
    // -------------------------------------------------------------------

    fn add_project(
        &mut self,
        name: &str,
        principal_investigator: Option<&str>,
    ) -> Result<Project, StorageError> {
        if let Some(existing) = self.get_project(name)? {
            return Ok(existing);
        }
        self.stage()?;
        self.conn.execute(
            "INSERT INTO projects (name, principal_investigator) VALUES (?1, ?2)",
            params![name, principal_investigator],
        )?;
        debug!(project = name, "added project");
        Ok(Project {
            id: ProjectId(self.conn.last_insert_rowid()),
            name: name.to_string(),
            principal_investigator: principal_investigator.map(str::to_string),
        })
    }

    fn get_project(&self, name: &str) -> Result<Option<Project>, StorageError> {
        self.query_unique(
            "project",
            name,
            "SELECT id, name, principal_investigator FROM projects WHERE name = ?1",
            params![name],
            Self::project_from_row,
        )
    }

    fn get_projects(&self, order: Option<NameOrder>) -> Result<Vec<Project>, StorageError> {
        let order_by = match order {
            Some(order) => format!("name {}", order.sql()),
            None => "id".to_string(),
        };
        let sql = format!(
            "SELECT id, name, principal_investigator FROM projects ORDER BY {order_by}"
        );
        self.query_all(&sql, [], Self::project_from_row)
    }

    fn add_material(
        &mut self,
        name: &str,
        grainsize: Option<&str>,
    ) -> Result<Material, StorageError> {
        if let Some(existing) = self.get_material(name)? {
            return Ok(existing);
        }
        self.stage()?;
        self.conn.execute(
            "INSERT INTO materials (name, grainsize) VALUES (?1, ?2)",
            params![name, grainsize],
        )?;
        Ok(Material {
            id: MaterialId(self.conn.last_insert_rowid()),
            name: name.to_string(),
            grainsize: grainsize.map(str::to_string),
        })
    }

    fn get_material(&self, name: &str) -> Result<Option<Material>, StorageError> {
        self.query_unique(
            "material",
            name,
            "SELECT id, name, grainsize FROM materials WHERE name = ?1",
            params![name],
            Self::material_from_row,
        )
    }

    fn get_material_names(&self) -> Result<Vec<String>, StorageError> {
        self.query_all("SELECT name FROM materials ORDER BY name ASC", [], |row| {
            row.get(0)
        })
    }

    // -------------------------------------------------------------------
    // Samples
    // -------------------------------------------------------------------

    fn add_sample(
        &mut self,
        name: &str,
        project: &str,
        material: Option<&str>,
    ) -> Result<Sample, StorageError> {
        if let Some(existing) = self.get_sample(name, project)? {
            return Ok(existing);
        }
        let project_row = self
            .get_project(project)?
            .ok_or_else(|| StorageError::ProjectNotFound(project.to_string()))?;
        let material_row = match material {
            Some(material) => Some(self.add_material(material, None)?),
            None => None,
        };
        let material_id = material_row.as_ref().map(|m| m.id);

        self.stage()?;
        self.conn.execute(
            "INSERT INTO samples (name, project_id, material_id) VALUES (?1, ?2, ?3)",
            params![name, project_row.id.0, material_id.map(|m| m.0)],
        )?;
        debug!(sample = name, project, "added sample");
        Ok(Sample {
            id: SampleId(self.conn.last_insert_rowid()),
            name: name.to_string(),
            project: project_row.id,
            material: material_id,
            igsn: None,
        })
    }

    fn get_sample(&self, name: &str, project: &str) -> Result<Option<Sample>, StorageError> {
        self.query_unique(
            "sample",
            name,
            "SELECT s.id, s.name, s.project_id, s.material_id, s.igsn FROM samples s \
             JOIN projects pr ON pr.id = s.project_id \
             WHERE pr.name = ?1 AND s.name = ?2",
            params![project, name],
            Self::sample_from_row,
        )
    }

    fn get_samples(&self, filter: &SampleFilter) -> Result<Vec<Sample>, StorageError> {
        let mut sql = String::from(
            "SELECT s.id, s.name, s.project_id, s.material_id, s.igsn FROM samples s \
             JOIN projects pr ON pr.id = s.project_id",
        );
        let values: Vec<Value> = filter
            .projects
            .iter()
            .map(|p| Value::Text(p.clone()))
            .collect();
        if !values.is_empty() {
            let placeholders = vec!["?"; values.len()].join(", ");
            sql.push_str(&format!(" WHERE pr.name IN ({placeholders})"));
        }
        match filter.order {
            Some(order) => sql.push_str(&format!(" ORDER BY s.name {}", order.sql())),
            None => sql.push_str(" ORDER BY s.id"),
        }
        self.query_all(&sql, params_from_iter(values.iter()), Self::sample_from_row)
    }

    fn set_sample_igsn(&mut self, sample: &Sample, igsn: &str) -> Result<(), StorageError> {
        self.stage()?;
        let changed = self.conn.execute(
            "UPDATE samples SET igsn = ?1 WHERE id = ?2",
            params![igsn, sample.id.0],
        )?;
        if changed == 0 {
            return Err(StorageError::IntegrityError {
                reason: format!("sample {} vanished before its IGSN was stored", sample.id),
            });
        }
        Ok(())
    }

    // -------------------------------------------------------------------
    // Mass spectrometers
    // -------------------------------------------------------------------

    fn add_mass_spectrometer(
        &mut self,
        name: &str,
        kind: &str,
    ) -> Result<MassSpectrometer, StorageError> {
        let existing = self.query_unique(
            "mass spectrometer",
            name,
            "SELECT id, name, kind FROM mass_spectrometers WHERE name = ?1",
            params![name],
            |row| {
                Ok(MassSpectrometer {
                    id: MassSpectrometerId(row.get(0)?),
                    name: row.get(1)?,
                    kind: row.get(2)?,
                })
            },
        )?;
        if let Some(existing) = existing {
            return Ok(existing);
        }
        self.stage()?;
        self.conn.execute(
            "INSERT INTO mass_spectrometers (name, kind) VALUES (?1, ?2)",
            params![name, kind],
        )?;
        Ok(MassSpectrometer {
            id: MassSpectrometerId(self.conn.last_insert_rowid()),
            name: name.to_string(),
            kind: kind.to_string(),
        })
    }

    fn get_mass_spectrometers(&self) -> Result<Vec<MassSpectrometer>, StorageError> {
        self.query_all(
            "SELECT id, name, kind FROM mass_spectrometers ORDER BY id",
            [],
            |row| {
                Ok(MassSpectrometer {
                    id: MassSpectrometerId(row.get(0)?),
                    name: row.get(1)?,
                    kind: row.get(2)?,
                })
            },
        )
    }

    // -------------------------------------------------------------------
    // Irradiations and levels
    // -------------------------------------------------------------------

    fn add_irradiation(&mut self, name: &str) -> Result<Irradiation, StorageError> {
        if let Some(existing) = self.get_irradiation(name)? {
            return Ok(existing);
        }
        self.stage()?;
        self.conn
            .execute("INSERT INTO irradiations (name) VALUES (?1)", params![name])?;
        debug!(irradiation = name, "added irradiation");
        Ok(Irradiation {
            id: IrradiationId(self.conn.last_insert_rowid()),
            name: name.to_string(),
        })
    }

    fn get_irradiation(&self, name: &str) -> Result<Option<Irradiation>, StorageError> {
        self.query_unique(
            "irradiation",
            name,
            "SELECT id, name FROM irradiations WHERE name = ?1",
            params![name],
            |row| {
                Ok(Irradiation {
                    id: IrradiationId(row.get(0)?),
                    name: row.get(1)?,
                })
            },
        )
    }

    fn get_irradiations(
        &self,
        filter: &IrradiationFilter,
    ) -> Result<Vec<Irradiation>, StorageError> {
        let mut sql = String::from("SELECT id, name FROM irradiations");
        let mut clauses = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(names) = &filter.names {
            if names.is_empty() {
                return Ok(Vec::new());
            }
            clauses.push(format!("name IN ({})", vec!["?"; names.len()].join(", ")));
            values.extend(names.iter().map(|n| Value::Text(n.clone())));
        }
        if let Some(prefix) = &filter.prefix {
            clauses.push("substr(name, 1, length(?)) = ?".to_string());
            values.push(Value::Text(prefix.clone()));
            values.push(Value::Text(prefix.clone()));
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        match filter.order {
            Some(order) => sql.push_str(&format!(" ORDER BY name {}", order.sql())),
            None => sql.push_str(" ORDER BY id"),
        }
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            values.push(Value::Integer(limit as i64));
        }

        self.query_all(&sql, params_from_iter(values.iter()), |row| {
            Ok(Irradiation {
                id: IrradiationId(row.get(0)?),
                name: row.get(1)?,
            })
        })
    }

    fn add_irradiation_level(
        &mut self,
        irradiation: &str,
        name: &str,
        holder: Option<&str>,
        z: Option<f64>,
        note: &str,
    ) -> Result<Level, StorageError> {
        let irradiation_row = self
            .get_irradiation(irradiation)?
            .ok_or_else(|| StorageError::IrradiationNotFound(irradiation.to_string()))?;
        if let Some(existing) = self.get_irradiation_level(irradiation, name)? {
            return Ok(existing);
        }
        self.stage()?;
        self.conn.execute(
            "INSERT INTO levels (irradiation_id, name, holder, z, note) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![irradiation_row.id.0, name, holder, z, note],
        )?;
        debug!(irradiation, level = name, "added level");
        Ok(Level {
            id: LevelId(self.conn.last_insert_rowid()),
            irradiation: irradiation_row.id,
            name: name.to_string(),
            holder: holder.map(str::to_string),
            z,
            note: note.to_string(),
        })
    }

    fn get_irradiation_level(
        &self,
        irradiation: &str,
        name: &str,
    ) -> Result<Option<Level>, StorageError> {
        self.query_unique(
            "level",
            name,
            "SELECT l.id, l.irradiation_id, l.name, l.holder, l.z, l.note FROM levels l \
             JOIN irradiations i ON i.id = l.irradiation_id \
             WHERE i.name = ?1 AND l.name = ?2",
            params![irradiation, name],
            Self::level_from_row,
        )
    }

    fn get_levels(&self, irradiation: &str) -> Result<Vec<Level>, StorageError> {
        self.query_all(
            "SELECT l.id, l.irradiation_id, l.name, l.holder, l.z, l.note FROM levels l \
             JOIN irradiations i ON i.id = l.irradiation_id \
             WHERE i.name = ?1 ORDER BY l.name ASC",
            params![irradiation],
            Self::level_from_row,
        )
    }

    // -------------------------------------------------------------------
    // Positions
    // -------------------------------------------------------------------

    fn add_irradiation_position(
        &mut self,
        irradiation: &str,
        level: &str,
        position: u32,
    ) -> Result<IrradiationPosition, StorageError> {
        let level_row = self.require_level(irradiation, level)?;
        if let Some(existing) = self.get_irradiation_position(irradiation, level, position)? {
            return Ok(existing);
        }
        self.stage()?;
        self.conn.execute(
            "INSERT INTO irradiation_positions (level_id, position) VALUES (?1, ?2)",
            params![level_row.id.0, position],
        )?;
        Ok(IrradiationPosition {
            id: PositionId(self.conn.last_insert_rowid()),
            level: level_row.id,
            position,
            identifier: None,
            sample: None,
            weight: 0.0,
            note: String::new(),
        })
    }

    fn get_irradiation_position(
        &self,
        irradiation: &str,
        level: &str,
        position: u32,
    ) -> Result<Option<IrradiationPosition>, StorageError> {
        let sql = format!(
            "SELECT {POSITION_COLUMNS} FROM irradiation_positions p \
             JOIN levels l ON l.id = p.level_id \
             JOIN irradiations i ON i.id = l.irradiation_id \
             WHERE i.name = ?1 AND l.name = ?2 AND p.position = ?3"
        );
        let key = format!("{irradiation}{level}{position}");
        self.query_unique(
            "irradiation position",
            &key,
            &sql,
            params![irradiation, level, position],
            Self::position_from_row,
        )
    }

    fn get_level_positions(
        &self,
        irradiation: &str,
        level: &str,
    ) -> Result<Vec<PositionDetail>, StorageError> {
        let sql = format!(
            "{DETAIL_SELECT} WHERE i.name = ?1 AND l.name = ?2 ORDER BY p.position ASC"
        );
        self.query_all(&sql, params![irradiation, level], Self::detail_from_row)
    }

    fn get_identifier(&self, identifier: &str) -> Result<Option<PositionDetail>, StorageError> {
        let sql = format!("{DETAIL_SELECT} WHERE p.identifier = ?1");
        self.query_unique(
            "identifier",
            identifier,
            &sql,
            params![identifier],
            Self::detail_from_row,
        )
    }

    fn update_position(
        &mut self,
        id: PositionId,
        update: &PositionUpdate,
    ) -> Result<IrradiationPosition, StorageError> {
        let mut row = self.get_position_by_id(id)?;
        if let Some(identifier) = &update.identifier {
            row.identifier = Some(identifier.clone()).filter(|i| !i.is_empty());
        }
        if let Some(sample) = update.sample {
            row.sample = Some(sample);
        }
        if let Some(weight) = update.weight {
            row.weight = weight;
        }
        if let Some(note) = &update.note {
            row.note = note.clone();
        }

        self.stage()?;
        self.conn.execute(
            "UPDATE irradiation_positions SET identifier = ?1, sample_id = ?2, weight = ?3, note = ?4 \
             WHERE id = ?5",
            params![
                row.identifier,
                row.sample.map(|s| s.0),
                row.weight,
                row.note,
                id.0
            ],
        )?;
        Ok(row)
    }

    fn remove_irradiation_position(
        &mut self,
        irradiation: &str,
        level: &str,
        position: u32,
    ) -> Result<bool, StorageError> {
        let Some(row) = self.get_irradiation_position(irradiation, level, position)? else {
            return Ok(false);
        };
        self.stage()?;
        let removed = self.conn.execute(
            "DELETE FROM irradiation_positions WHERE id = ?1",
            params![row.id.0],
        )?;
        debug!(irradiation, level, position, "removed irradiation position");
        Ok(removed > 0)
    }

    // -------------------------------------------------------------------
    // Analyses
    // -------------------------------------------------------------------

    fn add_analysis(&mut self, identifier: &str, aliquot: u32) -> Result<Analysis, StorageError> {
        let detail = self
            .get_identifier(identifier)?
            .ok_or_else(|| StorageError::IdentifierNotFound(identifier.to_string()))?;
        let position = detail.position.id;

        let existing = self
            .conn
            .query_row(
                "SELECT id FROM analyses WHERE position_id = ?1 AND aliquot = ?2",
                params![position.0, aliquot],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        let id = match existing {
            Some(id) => id,
            None => {
                self.stage()?;
                self.conn.execute(
                    "INSERT INTO analyses (position_id, aliquot) VALUES (?1, ?2)",
                    params![position.0, aliquot],
                )?;
                self.conn.last_insert_rowid()
            }
        };
        Ok(Analysis {
            id: AnalysisId(id),
            position,
            aliquot,
        })
    }
}
