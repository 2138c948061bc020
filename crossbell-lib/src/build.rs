//! The repack pipeline.
//!
//! One run opens the target (a disc image or an install directory), rewrites
//! every file that has translation input, repairs the cross-references the
//! engine keeps outside the directory tree, and finally saves: the whole image
//! to the destination for disc images, the staged files for install
//! directories. Nothing reaches storage before that final save, so a failed
//! run leaves every existing file untouched.

use std::path::{Path, PathBuf};

use crossbell_codec::{MonsterFile, ScenarioFile, TextTable, apply_patches, monster_note};
use crossbell_core::{ByteCursor, RepackError, Result, TextEncoding, TextItem};
use crossbell_iso::{DEFAULT_SECTOR_LIMIT, DiscImage, Placement};

use crate::config::{MonsterNoteConfig, TitleConfig};
use crate::fs::{DirectoryFileSystem, DiscFileSystem, FileSystem};
use crate::translation::{self, TranslationSet};
use crate::xref::{self, FileCategory, RewrittenFile, XrefReport};

/// Which release of the game is being repacked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameFormat {
    /// UMD disc image, Shift-JIS text.
    Psp,
    /// Installed PC release, GBK text.
    Pc,
}

impl GameFormat {
    pub fn encoding(self) -> TextEncoding {
        match self {
            Self::Psp => TextEncoding::ShiftJis,
            Self::Pc => TextEncoding::Gbk,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Psp => "PSP",
            Self::Pc => "PC",
        }
    }
}

/// What to repack, and where.
#[derive(Debug, Clone)]
pub struct BuildArgs {
    pub format: GameFormat,
    /// Disc image to read (PSP).
    pub source_iso: Option<PathBuf>,
    /// Where the repacked image is written (PSP).
    pub destination_iso: Option<PathBuf>,
    /// Install directory rewritten in place (PC).
    pub game_path: Option<PathBuf>,
    pub translation_path: PathBuf,
    /// Title layout override; see [`TitleConfig::resolve`].
    pub title_config: Option<PathBuf>,
}

impl BuildArgs {
    /// Reject missing or contradictory arguments before any work is done.
    pub fn validate(&self) -> Result<()> {
        if !self.translation_path.is_dir() {
            return Err(RepackError::validation(format!(
                "translation directory {} does not exist",
                self.translation_path.display()
            )));
        }
        match self.format {
            GameFormat::Psp => {
                if self.game_path.is_some() {
                    return Err(RepackError::validation(
                        "--game-path only applies to the PC format",
                    ));
                }
                let source = self
                    .source_iso
                    .as_deref()
                    .ok_or_else(|| RepackError::validation("PSP builds need a source ISO"))?;
                if self.destination_iso.is_none() {
                    return Err(RepackError::validation("PSP builds need a destination ISO"));
                }
                if !source.is_file() {
                    return Err(RepackError::validation(format!(
                        "source ISO {} does not exist",
                        source.display()
                    )));
                }
            }
            GameFormat::Pc => {
                if self.source_iso.is_some() || self.destination_iso.is_some() {
                    return Err(RepackError::validation(
                        "ISO paths only apply to the PSP format",
                    ));
                }
                let game = self
                    .game_path
                    .as_deref()
                    .ok_or_else(|| RepackError::validation("PC builds need a game path"))?;
                if !game.is_dir() {
                    return Err(RepackError::validation(format!(
                        "game directory {} does not exist",
                        game.display()
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Options controlling build behavior.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Skip files that fail to decode or re-encode instead of aborting.
    pub keep_going: bool,
    /// Highest sector relocated files may occupy.
    pub sector_limit: u32,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            keep_going: false,
            sector_limit: DEFAULT_SECTOR_LIMIT,
        }
    }
}

/// Progress information for callbacks.
#[derive(Debug, Clone)]
pub enum BuildProgress {
    LoadingImage { path: PathBuf },
    PatchingExecutable,
    /// Starting a codec stage over `total` candidate files.
    Stage { category: FileCategory, total: usize },
    File {
        category: FileCategory,
        path: String,
        index: usize,
        total: usize,
    },
    FixingReferences,
    Saving { path: PathBuf },
    Done,
}

/// A file that outgrew its extent and was appended to the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocation {
    pub path: String,
    pub from: u32,
    pub to: u32,
}

/// Summary of a build run.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub rewritten: Vec<RewrittenFile>,
    /// Files whose re-encoded bytes matched what was already there.
    pub unchanged: usize,
    /// Files without translation input.
    pub skipped: usize,
    pub relocated: Vec<Relocation>,
    /// Files skipped under `keep_going`, with the reason.
    pub failed: Vec<(String, String)>,
    pub eboot_patched: bool,
    pub xref: XrefReport,
    /// Declared volume size after the run (PSP only).
    pub volume_sectors: Option<u32>,
}

impl BuildReport {
    fn record_placement(&mut self, path: &str, placement: Placement) {
        if let Placement::Relocated { from, to } = placement {
            self.relocated.push(Relocation {
                path: path.to_string(),
                from,
                to,
            });
        }
    }
}

/// Run a complete build.
pub fn run_build(
    args: &BuildArgs,
    options: &BuildOptions,
    progress: &dyn Fn(BuildProgress),
) -> Result<BuildReport> {
    args.validate()?;
    let config = TitleConfig::resolve(args.title_config.as_deref())?;
    let translations = TranslationSet::new(&args.translation_path);
    log::info!(
        "Building {} ({}) from {}",
        config.title,
        args.format.name(),
        translations.root().display()
    );

    let report = match (args.format, &args.source_iso, &args.destination_iso, &args.game_path) {
        (GameFormat::Psp, Some(source), Some(destination), _) => build_disc(
            source,
            destination,
            &config,
            &translations,
            options,
            progress,
        )?,
        (GameFormat::Pc, _, _, Some(game)) => {
            let mut fs = DirectoryFileSystem::new(game);
            let mut report = BuildReport::default();
            let encoding = GameFormat::Pc.encoding();
            CodecStage::new(&config, &translations, encoding, options, progress, &mut report)
                .run(&mut fs)?;

            progress(BuildProgress::Saving { path: game.clone() });
            let written = fs.flush()?;
            log::info!("Wrote {} files under {}", written, game.display());
            report
        }
        _ => return Err(RepackError::validation("incomplete build arguments")),
    };

    progress(BuildProgress::Done);
    log::info!(
        "Rewrote {} files ({} relocated, {} unchanged, {} without translation, {} failed)",
        report.rewritten.len(),
        report.relocated.len(),
        report.unchanged,
        report.skipped,
        report.failed.len()
    );
    Ok(report)
}

fn build_disc(
    source: &Path,
    destination: &Path,
    config: &TitleConfig,
    translations: &TranslationSet,
    options: &BuildOptions,
    progress: &dyn Fn(BuildProgress),
) -> Result<BuildReport> {
    progress(BuildProgress::LoadingImage {
        path: source.to_path_buf(),
    });
    let image = DiscImage::open(source)?.with_sector_limit(options.sector_limit);
    let mut fs = DiscFileSystem::new(image, &config.disc_root);
    let mut report = BuildReport::default();

    progress(BuildProgress::PatchingExecutable);
    patch_eboot(fs.image_mut(), config, translations, &mut report)?;

    let encoding = GameFormat::Psp.encoding();
    CodecStage::new(config, translations, encoding, options, progress, &mut report)
        .run(&mut fs)?;

    progress(BuildProgress::FixingReferences);
    report.xref = xref::fix_references(&mut fs, &config.references, &report.rewritten)?;

    let mut image = fs.into_image();
    report.volume_sectors = Some(image.update_volume_size());

    progress(BuildProgress::Saving {
        path: destination.to_path_buf(),
    });
    image.save(destination)?;
    log::info!("Saved {}", destination.display());
    Ok(report)
}

/// Replace the executable with the translated one and apply the configured
/// patches on top.
fn patch_eboot(
    image: &mut DiscImage,
    config: &TitleConfig,
    translations: &TranslationSet,
    report: &mut BuildReport,
) -> Result<()> {
    let Some(mut eboot) = translations.eboot()? else {
        log::info!("No translated executable, leaving {} as is", config.eboot_path);
        return Ok(());
    };
    apply_patches(&mut eboot, &config.eboot_patches, TextEncoding::ShiftJis)?;
    if image.read(&config.eboot_path)? == eboot {
        report.unchanged += 1;
        return Ok(());
    }
    let placement = image.replace(&config.eboot_path, &eboot)?;
    report.record_placement(&config.eboot_path, placement);
    report.eboot_patched = true;
    log::info!(
        "Patched {} ({} patches)",
        config.eboot_path,
        config.eboot_patches.len()
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Codec stage
// ---------------------------------------------------------------------------

/// Rewrites text-bearing files through whichever file system backs the run.
struct CodecStage<'a> {
    config: &'a TitleConfig,
    translations: &'a TranslationSet,
    encoding: TextEncoding,
    options: &'a BuildOptions,
    progress: &'a dyn Fn(BuildProgress),
    report: &'a mut BuildReport,
}

impl<'a> CodecStage<'a> {
    fn new(
        config: &'a TitleConfig,
        translations: &'a TranslationSet,
        encoding: TextEncoding,
        options: &'a BuildOptions,
        progress: &'a dyn Fn(BuildProgress),
        report: &'a mut BuildReport,
    ) -> Self {
        Self {
            config,
            translations,
            encoding,
            options,
            progress,
            report,
        }
    }

    fn run(mut self, fs: &mut dyn FileSystem) -> Result<()> {
        self.text_tables(fs)?;
        self.scenarios(fs)?;
        self.monsters(fs)?;
        self.monster_note(fs)
    }

    fn text_tables(&mut self, fs: &mut dyn FileSystem) -> Result<()> {
        let config = self.config;
        let total = config.text_files.len();
        (self.progress)(BuildProgress::Stage {
            category: FileCategory::Text,
            total,
        });
        for (index, file) in config.text_files.iter().enumerate() {
            let path = config.text_path(file);
            self.announce(FileCategory::Text, &path, index, total);
            let Some(items) = self.load_items(translation::TEXT, &path)? else {
                continue;
            };
            let encoding = self.encoding;
            self.process(fs, FileCategory::Text, &path, |cursor| {
                let table = TextTable::parse(cursor.bytes(), &file.layout, encoding)?;
                let strings: Vec<&str> = items.iter().map(TextItem::best_text).collect();
                table.rebuild(&strings)
            })?;
        }
        Ok(())
    }

    fn scenarios(&mut self, fs: &mut dyn FileSystem) -> Result<()> {
        let paths = fs.list_children(&self.config.scenario_dir, &self.config.scenario_glob)?;
        let overrides = self.translations.string_table()?;
        let total = paths.len();
        (self.progress)(BuildProgress::Stage {
            category: FileCategory::Scenario,
            total,
        });
        for (index, path) in paths.iter().enumerate() {
            self.announce(FileCategory::Scenario, path, index, total);
            let items = self.load_items(translation::SCENARIO, path)?;
            if items.is_none() && overrides.is_empty() {
                continue;
            }
            self.process(fs, FileCategory::Scenario, path, |cursor| {
                let mut scenario = ScenarioFile::parse(cursor)?;
                if let Some(items) = &items {
                    scenario.replace_strings(items)?;
                }
                let merged = scenario.merge_string_table(&overrides);
                if merged > 0 {
                    log::debug!("Merged {} shared strings into {}", merged, path);
                }
                scenario.write()
            })?;
        }
        Ok(())
    }

    fn monsters(&mut self, fs: &mut dyn FileSystem) -> Result<()> {
        let paths = fs.list_children(&self.config.monster_dir, &self.config.monster_glob)?;
        let total = paths.len();
        (self.progress)(BuildProgress::Stage {
            category: FileCategory::Monster,
            total,
        });
        for (index, path) in paths.iter().enumerate() {
            self.announce(FileCategory::Monster, path, index, total);
            let Some(items) = self.load_items(translation::MONSTER, path)? else {
                continue;
            };
            self.process(fs, FileCategory::Monster, path, |cursor| {
                let mut monster = MonsterFile::parse(cursor)?;
                let strings: Vec<&str> = items.iter().map(TextItem::best_text).collect();
                monster.set_strings(&strings)?;
                monster.write()
            })?;
        }
        Ok(())
    }

    /// Rebuild the bestiary archive when any monster file changed.
    fn monster_note(&mut self, fs: &mut dyn FileSystem) -> Result<()> {
        let config = self.config;
        let Some(note) = &config.monster_note else {
            return Ok(());
        };
        let monsters_changed = self
            .report
            .rewritten
            .iter()
            .any(|f| f.category == FileCategory::Monster);
        if !monsters_changed {
            return Ok(());
        }
        (self.progress)(BuildProgress::Stage {
            category: FileCategory::MonsterNote,
            total: 1,
        });
        self.announce(FileCategory::MonsterNote, &note.path, 0, 1);

        let original = if fs.exists(&note.path) {
            fs.open(&note.path, self.encoding)?.into_inner()
        } else {
            Vec::new()
        };
        let outcome = self.build_monster_note(fs, note);
        self.commit(fs, FileCategory::MonsterNote, &note.path, &original, outcome)
    }

    fn build_monster_note(&self, fs: &dyn FileSystem, note: &MonsterNoteConfig) -> Result<Vec<u8>> {
        let mut monsters = Vec::with_capacity(note.files.len());
        for number in &note.files {
            let path = self.config.monster_path(number);
            if !fs.exists(&path) {
                log::warn!("Monster note lists {} but it is missing, skipping", path);
                continue;
            }
            monsters.push((number.as_str(), fs.open(&path, self.encoding)?.into_inner()));
        }
        monster_note::build(monsters.iter().map(|(n, data)| (*n, data.as_slice())))
    }

    // -- Per-file plumbing --

    fn announce(&self, category: FileCategory, path: &str, index: usize, total: usize) {
        (self.progress)(BuildProgress::File {
            category,
            path: path.to_string(),
            index,
            total,
        });
    }

    fn load_items(&mut self, category: &str, path: &str) -> Result<Option<Vec<TextItem>>> {
        let items = self.translations.items(category, path)?;
        if items.is_none() {
            log::debug!("No translation for {}", path);
            self.report.skipped += 1;
        }
        Ok(items)
    }

    fn process<F>(
        &mut self,
        fs: &mut dyn FileSystem,
        category: FileCategory,
        path: &str,
        rewrite: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut ByteCursor) -> Result<Vec<u8>>,
    {
        let mut cursor = fs.open(path, self.encoding)?;
        let outcome = rewrite(&mut cursor);
        self.commit(fs, category, path, cursor.bytes(), outcome)
    }

    fn commit(
        &mut self,
        fs: &mut dyn FileSystem,
        category: FileCategory,
        path: &str,
        original: &[u8],
        outcome: Result<Vec<u8>>,
    ) -> Result<()> {
        let data = match outcome {
            Ok(data) => data,
            Err(err) => return self.fail(path, err),
        };
        if data == original {
            log::debug!("{} is unchanged", path);
            self.report.unchanged += 1;
            return Ok(());
        }

        let placement = fs.save(path, &data)?;
        self.report.record_placement(path, placement);
        self.report.rewritten.push(RewrittenFile {
            category,
            path: path.to_string(),
        });
        log::info!(
            "Rewrote {} {} ({} -> {} bytes)",
            category.name(),
            path,
            original.len(),
            data.len()
        );
        Ok(())
    }

    fn fail(&mut self, path: &str, err: RepackError) -> Result<()> {
        let err = match err {
            RepackError::Format(msg) => RepackError::Format(format!("{}: {}", path, msg)),
            other => other,
        };
        if self.options.keep_going && err.is_file_local() {
            log::warn!("Skipping {}: {}", path, err);
            self.report.failed.push((path.to_string(), err.to_string()));
            Ok(())
        } else {
            Err(err)
        }
    }
}
