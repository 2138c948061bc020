//! Repack pipeline for the translated game: file system facade, title
//! configuration, translation input, cross-reference repair and the build
//! driver the CLI calls into.

pub mod build;
pub mod config;
pub mod fs;
pub mod settings;
pub mod translation;
pub mod xref;

pub use build::{BuildArgs, BuildOptions, BuildProgress, BuildReport, GameFormat, Relocation, run_build};
pub use config::TitleConfig;
pub use fs::{DirectoryFileSystem, DiscFileSystem, FileSystem};
pub use translation::TranslationSet;
pub use xref::{FileCategory, RewrittenFile, XrefReport};
