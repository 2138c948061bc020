use owo_colors::OwoColorize;
use owo_colors::Stream::Stderr;

use crossbell_core::util::format_bytes_approx;
use crossbell_lib::{BuildArgs, BuildOptions, BuildProgress, BuildReport, run_build};

use crate::CliError;
use crate::spinner::build_spinner;

/// Run the build command.
pub(crate) fn run_build_command(
    args: BuildArgs,
    keep_going: bool,
    quiet: bool,
) -> Result<(), CliError> {
    let options = BuildOptions {
        keep_going,
        ..BuildOptions::default()
    };

    log::info!(
        "Repacking {} with translations from {}",
        args.format.name().if_supports_color(Stderr, |t| t.bold()),
        args.translation_path
            .display()
            .if_supports_color(Stderr, |t| t.cyan()),
    );
    if keep_going {
        log::info!(
            "{}",
            "Files that fail to decode will be skipped".if_supports_color(Stderr, |t| t.dimmed()),
        );
    }
    crate::log_blank();

    let pb = build_spinner(quiet);
    let progress_callback = |progress: BuildProgress| match progress {
        BuildProgress::LoadingImage { path } => {
            pb.set_message(format!("Loading {}", path.display()));
        }
        BuildProgress::PatchingExecutable => pb.set_message("Patching executable"),
        BuildProgress::Stage { category, total } => {
            pb.set_message(format!("Rewriting {} files ({} found)", category.name(), total));
        }
        BuildProgress::File {
            category,
            path,
            index,
            total,
        } => {
            pb.set_message(format!(
                "[{}/{}] {} {}",
                index + 1,
                total,
                category.name(),
                path
            ));
        }
        BuildProgress::FixingReferences => pb.set_message("Fixing cross-references"),
        BuildProgress::Saving { path } => {
            pb.set_message(format!("Saving {}", path.display()));
        }
        BuildProgress::Done => pb.finish_and_clear(),
    };

    let result = run_build(&args, &options, &progress_callback);
    pb.finish_and_clear();
    print_summary(&result?);
    Ok(())
}

fn print_summary(report: &BuildReport) {
    log::info!(
        "{}",
        "Build complete".if_supports_color(Stderr, |t| t.bold())
    );
    log::info!(
        "  {} files rewritten",
        report
            .rewritten
            .len()
            .if_supports_color(Stderr, |t| t.green()),
    );
    for relocation in &report.relocated {
        log::info!(
            "    {} moved from sector {} to {}",
            relocation.path,
            relocation.from,
            relocation.to,
        );
    }
    if report.eboot_patched {
        log::info!("  executable patched");
    }
    log::info!(
        "{}",
        format!(
            "  {} unchanged, {} without translation",
            report.unchanged, report.skipped
        )
        .if_supports_color(Stderr, |t| t.dimmed()),
    );

    let xref = &report.xref;
    if xref.index_updates > 0 || xref.references_scrubbed > 0 || xref.map_records_cleared > 0 {
        log::info!(
            "  {} index records updated, {} references scrubbed, {} map records cleared",
            xref.index_updates,
            xref.references_scrubbed,
            xref.map_records_cleared,
        );
    }
    for path in &xref.missing_index_records {
        log::warn!("  {} has no index record", path);
    }

    if let Some(sectors) = report.volume_sectors {
        log::info!(
            "  volume size {} sectors ({})",
            sectors,
            format_bytes_approx(u64::from(sectors) * 2048),
        );
    }

    if !report.failed.is_empty() {
        crate::log_blank();
        log::warn!(
            "{} files skipped after errors:",
            report.failed.len().if_supports_color(Stderr, |t| t.red()),
        );
        for (_, reason) in &report.failed {
            log::warn!("  {}", reason);
        }
    }
}
