// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Database service operations: readiness probe, restore and snapshot.
//!
//! Restore is destroy-then-import. For SQL dumps the logical database is
//! dropped and recreated before the dump is streamed into `psql`, so objects
//! left behind by a previous partial run never collide with the import. For
//! DuckDB the file inside the volume is removed before the host copy is put
//! in its place.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info};

use crate::command::{CommandRunner, CommandSpec};
use crate::compose::Compose;
use crate::config::{BackupFormat, Config};
use crate::error::Result;

/// Image used for copying files in and out of the DuckDB volume.
const VOLUME_HELPER_IMAGE: &str = "alpine";
/// Mount point of the data volume inside the helper container.
const VOLUME_MOUNT: &str = "/data";
/// Mount point of the host backup directory inside the helper container.
const BACKUP_MOUNT: &str = "/backup";

/// Database service bound to its backup location.
#[derive(Debug, Clone)]
pub struct Database {
    compose: Compose,
    service: String,
    name: String,
    user: String,
    password: Option<String>,
    maintenance_db: String,
    format: BackupFormat,
    backup_file: PathBuf,
    volume: String,
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

impl Database {
    /// Database described by the controller configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            compose: Compose::from_config(config),
            service: config.db_service.clone(),
            name: config.db_name.clone(),
            user: config.db_user.clone(),
            password: config.db_password.clone(),
            maintenance_db: config.maintenance_db.clone(),
            format: config.backup_format,
            backup_file: config.backup_file().to_path_buf(),
            volume: config.duckdb_volume.clone(),
        }
    }

    /// Compose service name.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Backup file on the host.
    pub fn backup_file(&self) -> &Path {
        &self.backup_file
    }

    /// Whether a backup exists on the host.
    pub async fn backup_exists(&self) -> Result<bool> {
        Ok(fs::try_exists(&self.backup_file).await?)
    }

    fn exec(&self, command: &[&str]) -> CommandSpec {
        match &self.password {
            Some(password) => {
                self.compose
                    .exec(&self.service, &[("PGPASSWORD", password.as_str())], command)
            }
            None => self.compose.exec(&self.service, &[], command),
        }
    }

    fn psql(&self, database: &str, sql: &str) -> CommandSpec {
        self.exec(&[
            "psql",
            "-U",
            &self.user,
            "-d",
            database,
            "-v",
            "ON_ERROR_STOP=1",
            "-c",
            sql,
        ])
    }

    /// Liveness probe for the service.
    pub fn probe_spec(&self) -> CommandSpec {
        match self.format {
            BackupFormat::SqlDump => self.exec(&["pg_isready", "-U", &self.user, "-d", &self.name]),
            BackupFormat::DuckDbFile => CommandSpec::new("docker").args([
                "volume",
                "inspect",
                self.volume.as_str(),
            ]),
        }
    }

    /// `DROP DATABASE IF EXISTS`, issued against the maintenance database.
    pub fn drop_spec(&self) -> CommandSpec {
        let sql = format!("DROP DATABASE IF EXISTS {};", quote_ident(&self.name));
        self.psql(&self.maintenance_db, &sql)
    }

    /// `CREATE DATABASE`, issued against the maintenance database.
    pub fn create_spec(&self) -> CommandSpec {
        let sql = format!("CREATE DATABASE {};", quote_ident(&self.name));
        self.psql(&self.maintenance_db, &sql)
    }

    /// `psql` import reading the dump from stdin.
    ///
    /// Stops at the first failing statement so a truncated dump exits non-zero.
    pub fn import_spec(&self) -> CommandSpec {
        self.exec(&[
            "psql",
            "-q",
            "-U",
            &self.user,
            "-d",
            &self.name,
            "-v",
            "ON_ERROR_STOP=1",
        ])
        .stdin_from(&self.backup_file)
    }

    /// `pg_dump` writing into the backup file.
    pub fn dump_spec(&self) -> CommandSpec {
        self.exec(&["pg_dump", "-U", &self.user, "-d", &self.name])
            .stdout_to(&self.backup_file)
    }

    /// Helper container running `script` with the file name as `$1`.
    ///
    /// The name never becomes part of the script text.
    fn volume_spec(&self, host_dir: &Path, script: String) -> CommandSpec {
        CommandSpec::new("docker")
            .args(["run", "--rm", "-v"])
            .arg(format!("{}:{}", self.volume, VOLUME_MOUNT))
            .arg("-v")
            .arg(format!("{}:{}", host_dir.display(), BACKUP_MOUNT))
            .args([VOLUME_HELPER_IMAGE, "sh", "-c"])
            .arg(script)
            .arg("sh")
            .arg(self.file_name())
    }

    fn file_name(&self) -> String {
        self.backup_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "pipeline.duckdb".to_string())
    }

    async fn host_dir(&self) -> Result<PathBuf> {
        let dir = match self.backup_file.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).await?;
        Ok(std::path::absolute(&dir)?)
    }

    /// Copy the host DuckDB file into the volume, replacing whatever is there.
    pub async fn volume_restore_spec(&self) -> Result<CommandSpec> {
        let script = format!(
            r#"rm -f "{mount}/$1" && cp "{backup}/$1" "{mount}/$1""#,
            mount = VOLUME_MOUNT,
            backup = BACKUP_MOUNT,
        );
        Ok(self.volume_spec(&self.host_dir().await?, script))
    }

    /// Copy the DuckDB file out of the volume onto the host.
    pub async fn volume_snapshot_spec(&self) -> Result<CommandSpec> {
        let script = format!(
            r#"cp "{mount}/$1" "{backup}/$1""#,
            mount = VOLUME_MOUNT,
            backup = BACKUP_MOUNT,
        );
        Ok(self.volume_spec(&self.host_dir().await?, script))
    }

    /// Replace the database content with the backup.
    ///
    /// Every step must succeed; the first failure aborts the restore.
    pub async fn restore(&self, runner: &dyn CommandRunner) -> Result<()> {
        info!(
            service = %self.service,
            backup = %self.backup_file.display(),
            "Restoring database from backup"
        );

        match self.format {
            BackupFormat::SqlDump => {
                runner.check(&self.drop_spec()).await?;
                runner.check(&self.create_spec()).await?;
                runner.check(&self.import_spec()).await?;
            }
            BackupFormat::DuckDbFile => {
                runner.check(&self.volume_restore_spec().await?).await?;
            }
        }

        info!(database = %self.name, "Database restored");
        Ok(())
    }

    /// Write the current database content to the backup file.
    pub async fn snapshot(&self, runner: &dyn CommandRunner) -> Result<PathBuf> {
        match self.format {
            BackupFormat::SqlDump => {
                if let Some(dir) = self.backup_file.parent()
                    && !dir.as_os_str().is_empty()
                {
                    fs::create_dir_all(dir).await?;
                }
                debug!(backup = %self.backup_file.display(), "Dumping database");
                runner.check(&self.dump_spec()).await?;
            }
            BackupFormat::DuckDbFile => {
                runner.check(&self.volume_snapshot_spec().await?).await?;
            }
        }

        info!(backup = %self.backup_file.display(), "Backup saved");
        Ok(self.backup_file.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sql_db() -> Database {
        Database::from_config(&Config::default())
    }

    #[test]
    fn test_probe_spec() {
        assert_eq!(
            sql_db().probe_spec().command_line(),
            "docker compose exec -T pipeline-db pg_isready -U airflow -d pipeline"
        );
    }

    #[test]
    fn test_drop_and_create_target_maintenance_db() {
        let db = sql_db();
        let drop = db.drop_spec().command_line();
        let create = db.create_spec().command_line();

        assert!(drop.contains("psql -U airflow -d postgres -v ON_ERROR_STOP=1"));
        assert!(drop.ends_with("DROP DATABASE IF EXISTS \"pipeline\";"));
        assert!(create.ends_with("CREATE DATABASE \"pipeline\";"));
    }

    #[test]
    fn test_import_and_dump_redirects() {
        let db = sql_db();
        let import = db.import_spec();
        let dump = db.dump_spec();

        assert_eq!(
            import.stdin.as_deref(),
            Some(Path::new("./data/pipeline_backup.sql"))
        );
        assert!(
            import
                .command_line()
                .ends_with("psql -q -U airflow -d pipeline -v ON_ERROR_STOP=1")
        );
        assert_eq!(
            dump.stdout.as_deref(),
            Some(Path::new("./data/pipeline_backup.sql"))
        );
        assert!(dump.command_line().ends_with("pg_dump -U airflow -d pipeline"));
    }

    #[test]
    fn test_password_is_forwarded() {
        let config = Config {
            db_password: Some("secret".to_string()),
            ..Config::default()
        };
        let spec = Database::from_config(&config).dump_spec();
        assert!(spec.command_line().contains("-e PGPASSWORD pipeline-db"));
        assert_eq!(spec.env.get("PGPASSWORD").map(String::as_str), Some("secret"));
    }

    #[test]
    fn test_identifier_quoting() {
        assert_eq!(quote_ident("pipeline"), "\"pipeline\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[tokio::test]
    async fn test_duckdb_volume_specs() {
        let temp = tempfile::TempDir::new().unwrap();
        let config = Config {
            backup_format: BackupFormat::DuckDbFile,
            duckdb_file: temp.path().join("pipeline.duckdb"),
            duckdb_volume: "pipeline-data".to_string(),
            ..Config::default()
        };
        let db = Database::from_config(&config);

        assert_eq!(
            db.probe_spec().command_line(),
            "docker volume inspect pipeline-data"
        );

        let restore = db.volume_restore_spec().await.unwrap();
        let line = restore.command_line();
        assert!(line.starts_with("docker run --rm -v pipeline-data:/data -v "));
        assert!(line.contains(":/backup alpine sh -c"));
        assert_eq!(
            restore.args[restore.args.len() - 3..],
            [
                r#"rm -f "/data/$1" && cp "/backup/$1" "/data/$1""#,
                "sh",
                "pipeline.duckdb",
            ]
        );

        let snapshot = db.volume_snapshot_spec().await.unwrap();
        assert_eq!(
            snapshot.args[snapshot.args.len() - 3..],
            [r#"cp "/data/$1" "/backup/$1""#, "sh", "pipeline.duckdb"]
        );
    }

    #[tokio::test]
    async fn test_duckdb_file_name_stays_out_of_script() {
        let temp = tempfile::TempDir::new().unwrap();
        let config = Config {
            backup_format: BackupFormat::DuckDbFile,
            duckdb_file: temp.path().join("my db; rm -rf x.duckdb"),
            ..Config::default()
        };
        let db = Database::from_config(&config);

        for spec in [
            db.volume_restore_spec().await.unwrap(),
            db.volume_snapshot_spec().await.unwrap(),
        ] {
            let script = &spec.args[spec.args.len() - 3];
            assert!(!script.contains("rm -rf x"));
            assert_eq!(spec.args.last().unwrap(), "my db; rm -rf x.duckdb");
        }
    }
}
