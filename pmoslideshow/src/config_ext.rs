//! Extension de pmoconfig pour les slideshows

use crate::manager::ManagerOptions;
use crate::validator::ValidatorOptions;
use crate::Result;
use std::path::PathBuf;
use std::time::Duration;

/// Trait d'extension pour pmoconfig::Config
pub trait SlideshowConfigExt {
    /// Chemin de la base SQLite (le répertoire est créé si nécessaire)
    fn slideshow_db_path(&self) -> Result<PathBuf>;

    fn manager_options(&self) -> Result<ManagerOptions>;

    fn validator_options(&self) -> Result<ValidatorOptions>;
}

impl SlideshowConfigExt for pmoconfig::Config {
    fn slideshow_db_path(&self) -> Result<PathBuf> {
        let dir = self.get_managed_dir(&["slideshow", "directory"], "slideshow")?;
        Ok(PathBuf::from(dir).join("slideshow.db"))
    }

    fn manager_options(&self) -> Result<ManagerOptions> {
        Ok(ManagerOptions {
            validation_timeout: Duration::from_secs(self.get_validation_timeout_secs()?),
            lock_timeout: Duration::from_millis(self.get_lock_timeout_ms()?),
            max_batch_size: self.get_max_batch_size()?,
            delete_image_attempts: self.get_delete_image_attempts()?,
        })
    }

    fn validator_options(&self) -> Result<ValidatorOptions> {
        Ok(ValidatorOptions {
            connect_timeout: Duration::from_secs(self.get_validation_connect_timeout_secs()?),
            request_timeout: Duration::from_secs(self.get_validation_request_timeout_secs()?),
            ..ValidatorOptions::default()
        })
    }
}
