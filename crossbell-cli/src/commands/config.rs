use std::path::Path;

use owo_colors::OwoColorize;
use owo_colors::Stream::Stderr;

use crossbell_lib::TitleConfig;
use crossbell_lib::settings;

use crate::CliError;

/// Print the settings file path.
pub(crate) fn run_config_path() {
    log::info!("{}", settings::settings_path().display());
}

/// Show the settings file and which title layout a build would use.
pub(crate) fn run_config_show() -> Result<(), CliError> {
    let path = settings::settings_path();
    if path.exists() {
        log::info!(
            "Settings file: {} {}",
            path.display().if_supports_color(Stderr, |t| t.cyan()),
            "(exists)".if_supports_color(Stderr, |t| t.green()),
        );
    } else {
        log::info!(
            "Settings file: {} {}",
            path.display().if_supports_color(Stderr, |t| t.cyan()),
            "(not found)".if_supports_color(Stderr, |t| t.dimmed()),
        );
    }

    match settings::resolve_title_config(None) {
        Some(layout) => log::info!("Title layout:  {}", layout.display()),
        None => log::info!(
            "Title layout:  {}",
            "built-in".if_supports_color(Stderr, |t| t.dimmed())
        ),
    }

    let config = TitleConfig::resolve(None)?;
    log::info!(
        "  {}: {} text files, monster note {}, {} executable patches",
        config.title.if_supports_color(Stderr, |t| t.bold()),
        config.text_files.len(),
        if config.monster_note.is_some() { "on" } else { "off" },
        config.eboot_patches.len(),
    );

    let contents = settings::Settings::load(&path)?.to_toml()?;
    if !contents.trim().is_empty() {
        crate::log_blank();
        log::info!("{}", contents.trim_end());
    }
    Ok(())
}

/// Save a title layout as the default after checking that it parses.
pub(crate) fn run_config_set(path: &Path) -> Result<(), CliError> {
    let absolute = std::fs::canonicalize(path)?;
    let config = TitleConfig::load(&absolute)?;
    settings::save_title_config(Some(&absolute))?;
    log::info!(
        "Default title layout set to {} ({})",
        absolute.display().if_supports_color(Stderr, |t| t.cyan()),
        config.title,
    );
    Ok(())
}

/// Forget the saved title layout.
pub(crate) fn run_config_clear() -> Result<(), CliError> {
    settings::save_title_config(None)?;
    log::info!("Default title layout cleared, the built-in layout will be used");
    Ok(())
}
