//! Writing the objects file and activating it in the monitoring core.
//!
//! A restart keeps the previous objects file as `<file>.save` until the new
//! configuration has been validated by the core. An invalid configuration is
//! rolled back before the core is touched.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tokio::process::Command;

use crate::engine::{Engine, EngineError};
use crate::{nagios, precompile};

/// Errors while activating a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ActivationError {
    /// The objects file could not be generated or written.
    #[error("Error creating configuration: {0}")]
    CreateConfig(#[source] EngineError),

    /// The core rejected the new configuration; the old one is back.
    #[error("Nagios configuration is invalid. Rolling back.")]
    InvalidConfig {
        /// Output of the validation run.
        output: String,
    },

    /// The init script failed.
    #[error("Cannot re{} Nagios", .action.verb())]
    Core {
        /// Requested action.
        action: CoreAction,
        /// Output of the init script.
        output: String,
    },

    /// A file or program could not be handled.
    #[error("{}: {source}", .path.display())]
    Io {
        /// File or program involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Precompiling host checks failed.
    #[error(transparent)]
    Precompile(#[from] EngineError),
}

/// What to ask the init script for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreAction {
    /// Full restart.
    Restart,
    /// Configuration reload.
    Reload,
}

impl CoreAction {
    /// `start` or `load`, completing `re…`.
    pub fn verb(self) -> &'static str {
        match self {
            Self::Restart => "start",
            Self::Reload => "load",
        }
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ActivationError {
    let path = path.to_path_buf();
    move |source| ActivationError::Io { path, source }
}

/// `<objects file>.save`.
pub fn backup_path(objects_file: &Path) -> PathBuf {
    let mut name = OsString::from(objects_file.as_os_str());
    name.push(".save");
    PathBuf::from(name)
}

/// Render every active host into the objects file.
pub fn create_config(engine: &Engine) -> Result<PathBuf, ActivationError> {
    let path = engine.config().paths.nagios_objects_file();
    let text = nagios::render(engine).map_err(ActivationError::CreateConfig)?;
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| {
            ActivationError::CreateConfig(EngineError::Io {
                path: dir.to_path_buf(),
                source,
            })
        })?;
    }
    std::fs::write(&path, text).map_err(|source| {
        ActivationError::CreateConfig(EngineError::Io {
            path: path.clone(),
            source,
        })
    })?;
    tracing::info!(path = %path.display(), "generated Nagios configuration");
    Ok(path)
}

/// Write the objects file and precompile all host checks without touching
/// the core.
pub fn update(engine: &Engine) -> Result<PathBuf, ActivationError> {
    let path = create_config(engine)?;
    precompile::precompile_all(engine)?;
    Ok(path)
}

async fn run(program: &Path, args: &[&OsString]) -> Result<(bool, String), ActivationError> {
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(io_error(program))?;
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok((output.status.success(), text))
}

/// Let the core check its complete configuration.
pub async fn validate(engine: &Engine) -> Result<(), ActivationError> {
    let paths = &engine.config().paths;
    tracing::info!("validating Nagios configuration");
    tracing::debug!(binary = %paths.nagios_binary.display(), config = %paths.nagios_config_file.display(), "running");
    let flag = OsString::from("-v");
    let config = OsString::from(paths.nagios_config_file.as_os_str());
    let (ok, output) = run(&paths.nagios_binary, &[&flag, &config]).await?;
    if ok {
        Ok(())
    } else {
        tracing::error!(output = %output, "Nagios configuration check failed");
        Err(ActivationError::InvalidConfig { output })
    }
}

/// Restart or reload the core via its init script.
pub async fn restart_core(engine: &Engine, action: CoreAction) -> Result<(), ActivationError> {
    let script = &engine.config().paths.nagios_startscript;
    tracing::info!("re{}ing Nagios", action.verb());
    let argument = OsString::from(format!("re{}", action.verb()));
    let (ok, output) = run(script, &[&argument]).await?;
    if ok {
        Ok(())
    } else {
        Err(ActivationError::Core { action, output })
    }
}

/// Replace the objects file, validate it, precompile and restart or reload
/// the core. On an invalid configuration the previous file is restored, or
/// the new one removed when there was none.
pub async fn activate(engine: &Engine, action: CoreAction) -> Result<(), ActivationError> {
    let objects = engine.config().paths.nagios_objects_file();
    let backup = if objects.exists() {
        let backup = backup_path(&objects);
        tracing::debug!(from = %objects.display(), to = %backup.display(), "renaming");
        std::fs::rename(&objects, &backup).map_err(io_error(&objects))?;
        Some(backup)
    } else {
        None
    };

    let result = activate_with_backup(engine, action, &objects, backup.as_deref()).await;
    if result.is_err() {
        if let Some(backup) = backup.as_deref().filter(|b| b.exists()) {
            if let Err(e) = std::fs::remove_file(backup) {
                tracing::warn!(path = %backup.display(), error = %e, "cannot remove backup");
            }
        }
    }
    result
}

async fn activate_with_backup(
    engine: &Engine,
    action: CoreAction,
    objects: &Path,
    backup: Option<&Path>,
) -> Result<(), ActivationError> {
    if let Err(e) = create_config(engine) {
        if let Some(backup) = backup {
            std::fs::rename(backup, objects).map_err(io_error(backup))?;
        }
        return Err(e);
    }

    match validate(engine).await {
        Ok(()) => {
            if let Some(backup) = backup {
                std::fs::remove_file(backup).map_err(io_error(backup))?;
            }
            precompile::precompile_all(engine)?;
            restart_core(engine, action).await
        }
        Err(e) => {
            match backup {
                Some(backup) => std::fs::rename(backup, objects).map_err(io_error(backup))?,
                None => std::fs::remove_file(objects).map_err(io_error(objects))?,
            }
            Err(e)
        }
    }
}
