use std::cell::RefCell;
use std::path::{Path, PathBuf};

use crossbell_codec::scenario::Operand;
use crossbell_codec::{MonsterFile, ScenarioFile, TextTable, TextTableLayout, monster_note};
use crossbell_core::{ByteCursor, RepackError, TextEncoding, TextItem};
use crossbell_iso::DiscImage;
use crossbell_iso::testing::IsoBuilder;
use crossbell_lib::xref::IndexTable;
use crossbell_lib::*;
use tempfile::TempDir;

const CONFIG: &str = r#"
title = "Test Title"
disc_root = "PSP_GAME/USRDIR"
eboot_path = "PSP_GAME/SYSDIR/EBOOT.BIN"
text_dir = "data/text"
scenario_dir = "data/scena"
monster_dir = "data/battle/dat"

[[text_files]]
name = "t_item._dt"
header_size = 4

[[text_files]]
name = "t_magic._dt"
header_size = 4

[monster_note]
path = "data/monsnote/monsnote.dt2"
files = ["02102"]

[references]
index_file = "data.lst"
text_backrefs = ["data/system/sysstart.bbc"]
monster_backrefs = ["data/battle/btasm1.bbc"]
monster_note_backrefs = ["data/system/sysonmem.bbc"]
map_dir = "data/map4"

[[eboot_patches]]
offset = 4
kind = "zero"
count = 6

[[eboot_patches]]
offset = 4
kind = "text"
text = "Noel"
"#;

// -- Fixture files --

fn text_table(strings: &[&str]) -> Vec<u8> {
    let mut out = (strings.len() as u32).to_le_bytes().to_vec();
    let mut blob = Vec::new();
    for s in strings {
        out.extend_from_slice(&(blob.len() as u32).to_le_bytes());
        out.extend_from_slice(&(s.len() as u32).to_le_bytes());
        blob.extend_from_slice(s.as_bytes());
    }
    out.extend_from_slice(&blob);
    out
}

/// One entry point, one instruction with an inline string, one shared string.
fn scenario(line: &str, shared: &str) -> Vec<u8> {
    let mut code = vec![0x10, 1, 0x04];
    code.extend_from_slice(&(line.len() as u16).to_le_bytes());
    code.extend_from_slice(line.as_bytes());

    let code_offset = 0x20u32;
    let strings_offset = code_offset + code.len() as u32;
    let mut out = b"SCN\x01".to_vec();
    for field in [1, 0x1C, code_offset, code.len() as u32, strings_offset, 1] {
        out.extend_from_slice(&field.to_le_bytes());
    }
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&code);
    out.extend_from_slice(shared.as_bytes());
    out.push(0);
    out
}

/// Four bytes of stats, one 8-byte name slot, then a trailer.
fn monster(name: &str) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&4u16.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&12u16.to_le_bytes());
    out.extend_from_slice(&8u16.to_le_bytes());
    out.extend_from_slice(&[10, 20, 30, 40]);
    let mut slot = [0u8; 8];
    slot[..name.len()].copy_from_slice(name.as_bytes());
    out.extend_from_slice(&slot);
    out.extend_from_slice(b"END");
    out
}

fn index() -> Vec<u8> {
    let mut out = vec![0u8; 1024];
    out[..4].copy_from_slice(&4u32.to_le_bytes());
    for (i, ext) in ["_dt", "bin", "dat", "dt2"].iter().enumerate() {
        out[4 + i * 4..4 + i * 4 + 3].copy_from_slice(ext.as_bytes());
    }
    for (stem, ext) in [("t_item", 1u8), ("c0100", 2), ("ms02102", 3), ("monsnote", 4)] {
        let mut record = [0u8; 16];
        record[..stem.len()].copy_from_slice(stem.as_bytes());
        record[15] = ext;
        out.extend_from_slice(&record);
    }
    out
}

fn embedding(name: &str) -> Vec<u8> {
    let mut out = vec![0x33u8; 80];
    out[16..16 + name.len()].copy_from_slice(name.as_bytes());
    out
}

fn map_table() -> Vec<u8> {
    let mut out = vec![0u8; 16];
    out[..4].copy_from_slice(&2u32.to_le_bytes());
    for name in ["c0100.bin", "m0100.dat"] {
        let mut record = [0u8; 32];
        record[..name.len()].copy_from_slice(name.as_bytes());
        out.extend_from_slice(&record);
    }
    out
}

fn source_image() -> Vec<u8> {
    IsoBuilder::new()
        .file("PSP_GAME/SYSDIR/EBOOT.BIN", vec![0xEEu8; 16])
        .file("PSP_GAME/USRDIR/data.lst", index())
        .file("PSP_GAME/USRDIR/data/system/sysstart.bbc", embedding("t_item._dt"))
        .file("PSP_GAME/USRDIR/data/system/sysonmem.bbc", embedding("monsnote.dt2"))
        .file("PSP_GAME/USRDIR/data/battle/btasm1.bbc", embedding("ms02102.dat"))
        .file("PSP_GAME/USRDIR/data/map4/m0100.mc1", map_table())
        .file("PSP_GAME/USRDIR/data/text/t_item._dt", text_table(&["Potion", "Ether"]))
        .file("PSP_GAME/USRDIR/data/text/t_magic._dt", text_table(&["Fire"]))
        .file("PSP_GAME/USRDIR/data/scena/c0100.bin", scenario("Hi", "Shared"))
        .file("PSP_GAME/USRDIR/data/battle/dat/ms02102.dat", monster("Slime"))
        .file("PSP_GAME/USRDIR/data/monsnote/monsnote.dt2", vec![0xFFu8; 8])
        .build()
}

fn write_items(root: &Path, category: &str, stem: &str, items: &[TextItem]) {
    let dir = root.join(category);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join(format!("{stem}.json")),
        serde_json::to_string(items).unwrap(),
    )
    .unwrap();
}

// -- Workspace --

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("title.toml"), CONFIG).unwrap();
        std::fs::write(dir.path().join("source.iso"), source_image()).unwrap();
        std::fs::create_dir(dir.path().join("translation")).unwrap();
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn translation(&self) -> PathBuf {
        self.path("translation")
    }

    /// Translations for every kind of file, one of which outgrows its extent.
    fn translate_everything(&self) {
        let root = self.translation();
        let long = "A".repeat(3000);
        write_items(
            &root,
            "text",
            "t_item",
            &[TextItem::new("Potion", long), TextItem::new("Ether", "")],
        );
        write_items(&root, "scena", "c0100", &[TextItem::new("Hi", "Hello")]);
        write_items(&root, "monster", "ms02102", &[TextItem::new("Slime", "Jelly Monster")]);
        std::fs::write(root.join("EBOOT.BIN"), vec![0xEEu8; 16]).unwrap();
    }

    fn psp_args(&self, source: &str, destination: &str) -> BuildArgs {
        BuildArgs {
            format: GameFormat::Psp,
            source_iso: Some(self.path(source)),
            destination_iso: Some(self.path(destination)),
            game_path: None,
            translation_path: self.translation(),
            title_config: Some(self.path("title.toml")),
        }
    }

    fn disc(&self, name: &str) -> DiscFileSystem {
        DiscFileSystem::new(DiscImage::open(&self.path(name)).unwrap(), "PSP_GAME/USRDIR")
    }
}

fn build(args: &BuildArgs, options: &BuildOptions) -> Result<BuildReport, RepackError> {
    run_build(args, options, &|_| {})
}

fn read(fs: &DiscFileSystem, path: &str) -> Vec<u8> {
    fs.open(path, TextEncoding::ShiftJis).unwrap().into_inner()
}

fn has_rewritten(report: &BuildReport, category: FileCategory, path: &str) -> bool {
    report
        .rewritten
        .iter()
        .any(|f| f.category == category && f.path == path)
}

// -- PSP --

#[test]
fn psp_build_rewrites_files_and_references() {
    let ws = Workspace::new();
    ws.translate_everything();
    let report = build(&ws.psp_args("source.iso", "out.iso"), &BuildOptions::default()).unwrap();

    assert!(has_rewritten(&report, FileCategory::Text, "data/text/t_item._dt"));
    assert!(has_rewritten(&report, FileCategory::Scenario, "data/scena/c0100.bin"));
    assert!(has_rewritten(&report, FileCategory::Monster, "data/battle/dat/ms02102.dat"));
    assert!(has_rewritten(&report, FileCategory::MonsterNote, "data/monsnote/monsnote.dt2"));
    assert_eq!(report.rewritten.len(), 4);
    assert_eq!(report.skipped, 1);
    assert!(report.eboot_patched);
    assert!(report.failed.is_empty());
    assert!(report.relocated.iter().any(|r| r.path == "data/text/t_item._dt"));

    let fs = ws.disc("out.iso");

    // Text
    let table = TextTable::parse(
        &read(&fs, "data/text/t_item._dt"),
        &TextTableLayout::default(),
        TextEncoding::ShiftJis,
    )
    .unwrap();
    assert_eq!(table.entries()[0], "A".repeat(3000));
    assert_eq!(table.entries()[1], "Ether");
    assert_eq!(read(&fs, "data/text/t_magic._dt"), text_table(&["Fire"]));

    // Scenario
    let mut cursor = ByteCursor::new(read(&fs, "data/scena/c0100.bin"), TextEncoding::ShiftJis);
    let scena = ScenarioFile::parse(&mut cursor).unwrap();
    assert_eq!(scena.instructions()[0].operands, vec![Operand::String("Hello".to_string())]);
    assert_eq!(scena.string_table(), ["Shared".to_string()]);

    // Monster and monster note
    let monster_bytes = read(&fs, "data/battle/dat/ms02102.dat");
    let mut cursor = ByteCursor::new(monster_bytes.clone(), TextEncoding::ShiftJis);
    assert_eq!(MonsterFile::parse(&mut cursor).unwrap().strings(), ["Jelly Monster".to_string()]);
    let note = monster_note::build([("02102", monster_bytes.as_slice())]).unwrap();
    assert_eq!(read(&fs, "data/monsnote/monsnote.dt2"), note);

    // Index records follow every rewritten file
    let index = IndexTable::parse(read(&fs, "data.lst")).unwrap();
    for (path, stem, ext) in [
        ("data/text/t_item._dt", "t_item", "_dt"),
        ("data/scena/c0100.bin", "c0100", "bin"),
        ("data/battle/dat/ms02102.dat", "ms02102", "dat"),
        ("data/monsnote/monsnote.dt2", "monsnote", "dt2"),
    ] {
        let record = fs.record(path).unwrap();
        let entry = index.record(index.find(stem, ext).unwrap()).unwrap();
        assert_eq!((entry.length, entry.sector), (record.length, record.sector), "{path}");
    }
    assert_eq!(report.xref.index_updates, 4);

    // Stale name references are zeroed
    for path in [
        "data/system/sysstart.bbc",
        "data/system/sysonmem.bbc",
        "data/battle/btasm1.bbc",
    ] {
        let data = read(&fs, path);
        assert!(data[16..48].iter().all(|&b| b == 0), "{path}");
        assert!(data[..16].iter().all(|&b| b == 0x33), "{path}");
    }
    let map = read(&fs, "data/map4/m0100.mc1");
    assert!(map[16..48].iter().all(|&b| b == 0));
    assert_eq!(&map[48..57], b"m0100.dat");

    // Executable
    let image = fs.image();
    let eboot = image.read("PSP_GAME/SYSDIR/EBOOT.BIN").unwrap();
    assert_eq!(&eboot[..4], &[0xEE; 4]);
    assert_eq!(&eboot[4..8], b"Noel");
    assert_eq!(&eboot[8..10], &[0, 0]);
    assert_eq!(&eboot[10..], &[0xEE; 6]);

    // Volume size covers the relocated data
    assert_eq!(image.pvd().volume_space_size, image.highest_sector() + 1);
    assert_eq!(report.volume_sectors, Some(image.highest_sector() + 1));
}

#[test]
fn psp_build_is_idempotent() {
    let ws = Workspace::new();
    ws.translate_everything();
    let first = build(&ws.psp_args("source.iso", "out1.iso"), &BuildOptions::default()).unwrap();
    assert!(!first.rewritten.is_empty());

    let second = build(&ws.psp_args("out1.iso", "out2.iso"), &BuildOptions::default()).unwrap();
    assert!(second.rewritten.is_empty());
    assert!(second.relocated.is_empty());
    assert_eq!(
        std::fs::read(ws.path("out1.iso")).unwrap(),
        std::fs::read(ws.path("out2.iso")).unwrap()
    );
}

#[test]
fn psp_build_without_translations_is_noop() {
    let ws = Workspace::new();
    let report = build(&ws.psp_args("source.iso", "out.iso"), &BuildOptions::default()).unwrap();
    assert!(report.rewritten.is_empty());
    assert!(!report.eboot_patched);
    assert_eq!(report.skipped, 4);
    assert_eq!(
        std::fs::read(ws.path("source.iso")).unwrap(),
        std::fs::read(ws.path("out.iso")).unwrap()
    );
}

#[test]
fn format_error_aborts_without_writing() {
    let ws = Workspace::new();
    ws.translate_everything();
    // Two strings for a scenario with one inline string
    write_items(
        &ws.translation(),
        "scena",
        "c0100",
        &[TextItem::new("Hi", "Hello"), TextItem::new("Extra", "Extra")],
    );

    let err = build(&ws.psp_args("source.iso", "out.iso"), &BuildOptions::default()).unwrap_err();
    match err {
        RepackError::Format(msg) => assert!(msg.contains("data/scena/c0100.bin")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!ws.path("out.iso").exists());
}

#[test]
fn keep_going_skips_the_failing_file() {
    let ws = Workspace::new();
    ws.translate_everything();
    write_items(
        &ws.translation(),
        "scena",
        "c0100",
        &[TextItem::new("Hi", "Hello"), TextItem::new("Extra", "Extra")],
    );

    let options = BuildOptions {
        keep_going: true,
        ..BuildOptions::default()
    };
    let report = build(&ws.psp_args("source.iso", "out.iso"), &options).unwrap();
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "data/scena/c0100.bin");
    assert!(!has_rewritten(&report, FileCategory::Scenario, "data/scena/c0100.bin"));
    assert!(has_rewritten(&report, FileCategory::Text, "data/text/t_item._dt"));

    // The failed file and the map table naming it are untouched
    let fs = ws.disc("out.iso");
    assert_eq!(read(&fs, "data/scena/c0100.bin"), scenario("Hi", "Shared"));
    assert_eq!(read(&fs, "data/map4/m0100.mc1"), map_table());
}

#[test]
fn relocation_past_sector_limit_overflows() {
    let ws = Workspace::new();
    ws.translate_everything();
    let highest = DiscImage::from_bytes(source_image()).unwrap().highest_sector();

    let options = BuildOptions {
        sector_limit: highest,
        ..BuildOptions::default()
    };
    let err = build(&ws.psp_args("source.iso", "out.iso"), &options).unwrap_err();
    assert!(matches!(err, RepackError::Overflow { .. }));
    assert!(!ws.path("out.iso").exists());
}

#[test]
fn progress_reports_each_stage() {
    let ws = Workspace::new();
    ws.translate_everything();
    let events = RefCell::new(Vec::new());
    run_build(&ws.psp_args("source.iso", "out.iso"), &BuildOptions::default(), &|p| {
        events.borrow_mut().push(p)
    })
    .unwrap();

    let events = events.into_inner();
    assert!(matches!(events.first(), Some(BuildProgress::LoadingImage { .. })));
    assert!(matches!(events.last(), Some(BuildProgress::Done)));
    let stages: Vec<FileCategory> = events
        .iter()
        .filter_map(|e| match e {
            BuildProgress::Stage { category, .. } => Some(*category),
            _ => None,
        })
        .collect();
    assert_eq!(
        stages,
        vec![
            FileCategory::Text,
            FileCategory::Scenario,
            FileCategory::Monster,
            FileCategory::MonsterNote
        ]
    );
    assert!(events.iter().any(|e| matches!(e, BuildProgress::FixingReferences)));
}

#[test]
fn missing_source_is_validation_error() {
    let ws = Workspace::new();
    let err = build(&ws.psp_args("missing.iso", "out.iso"), &BuildOptions::default()).unwrap_err();
    assert!(matches!(err, RepackError::Validation(_)));
}

// -- PC --

/// Install directory with both text tables and empty scenario/monster dirs.
fn install_dir(ws: &Workspace) -> PathBuf {
    let game = ws.path("game");
    let text = game.join("data").join("text");
    std::fs::create_dir_all(&text).unwrap();
    std::fs::create_dir_all(game.join("data").join("scena")).unwrap();
    std::fs::create_dir_all(game.join("data").join("battle").join("dat")).unwrap();
    std::fs::write(text.join("t_item._dt"), text_table(&["Potion", "Ether"])).unwrap();
    std::fs::write(text.join("t_magic._dt"), text_table(&["Fire"])).unwrap();
    game
}

fn pc_args(ws: &Workspace, game: &Path) -> BuildArgs {
    BuildArgs {
        format: GameFormat::Pc,
        source_iso: None,
        destination_iso: None,
        game_path: Some(game.to_path_buf()),
        translation_path: ws.translation(),
        title_config: Some(ws.path("title.toml")),
    }
}

#[test]
fn pc_build_rewrites_directory_in_gbk() {
    let ws = Workspace::new();
    let game = install_dir(&ws);
    let text = game.join("data").join("text");
    write_items(
        &ws.translation(),
        "text",
        "t_item",
        &[TextItem::new("Potion", "药水"), TextItem::new("Ether", "")],
    );

    let args = pc_args(&ws, &game);
    let report = build(&args, &BuildOptions::default()).unwrap();
    assert_eq!(report.rewritten.len(), 1);
    assert_eq!(report.volume_sectors, None);

    let bytes = std::fs::read(text.join("t_item._dt")).unwrap();
    let table = TextTable::parse(&bytes, &TextTableLayout::default(), TextEncoding::Gbk).unwrap();
    assert_eq!(table.entries(), ["药水".to_string(), "Ether".to_string()]);
    assert_eq!(std::fs::read(text.join("t_magic._dt")).unwrap(), text_table(&["Fire"]));
}

#[test]
fn pc_format_error_leaves_install_untouched() {
    let ws = Workspace::new();
    let game = install_dir(&ws);
    let text = game.join("data").join("text");
    write_items(
        &ws.translation(),
        "text",
        "t_item",
        &[TextItem::new("Potion", "Elixir"), TextItem::new("Ether", "")],
    );
    // Two strings for a table with one entry
    write_items(
        &ws.translation(),
        "text",
        "t_magic",
        &[TextItem::new("Fire", "Flame"), TextItem::new("Ice", "Frost")],
    );

    let err = build(&pc_args(&ws, &game), &BuildOptions::default()).unwrap_err();
    match err {
        RepackError::Format(msg) => assert!(msg.contains("data/text/t_magic._dt")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(
        std::fs::read(text.join("t_item._dt")).unwrap(),
        text_table(&["Potion", "Ether"])
    );
    assert_eq!(std::fs::read(text.join("t_magic._dt")).unwrap(), text_table(&["Fire"]));
}
