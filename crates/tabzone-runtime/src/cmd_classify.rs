//! `tabzone classify --age-secs N`

use std::time::Duration;

use tabzone_core::{Settings, Status, classify};

use crate::cli::{ClassifyOpts, default_settings_path};
use crate::settings_source::{FileSettings, SettingsProvider};

pub(crate) fn classify_age(settings: &Settings, age_secs: u64) -> Status {
    classify(
        Duration::from_secs(age_secs),
        &settings.thresholds(),
        &settings.gates(),
    )
}

pub fn cmd_classify(opts: &ClassifyOpts) -> anyhow::Result<()> {
    let path = opts.settings.clone().unwrap_or_else(default_settings_path);
    let settings = FileSettings::new(path).current()?;
    println!("{}", classify_age(&settings, opts.age_secs));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_age_by_the_hour() {
        let settings = Settings::default();
        assert_eq!(classify_age(&settings, 59 * 60), Status::Fresh);
        assert_eq!(classify_age(&settings, 60 * 60), Status::Aging);
        assert_eq!(classify_age(&settings, 3 * 60 * 60), Status::Stale);
        // expiry is off by default
        assert_eq!(classify_age(&settings, 48 * 60 * 60), Status::Stale);
    }
}
