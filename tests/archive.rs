use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use walkdir::WalkDir;
use zeile::model::{DiagnosticSet, Locale};
use zeile::processor::{BuildOptions, Phase, build_ir};
use zeile::writer::{archive, bin};

fn tree(root: &Path) -> BTreeMap<String, Option<Vec<u8>>> {
    WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .map(|entry| {
            let entry = entry.unwrap();
            let rel = entry.path().strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/");
            let data = entry.file_type().is_file().then(|| fs::read(entry.path()).unwrap());
            (rel, data)
        })
        .collect()
}

#[test]
fn pack_then_extract_reproduces_story_and_assets() {
    let dir = tempfile::tempdir().unwrap();
    let assets = dir.path().join("Assets");
    fs::create_dir_all(assets.join("bg")).unwrap();
    fs::create_dir_all(assets.join("live2d/kasumi/motions")).unwrap();
    fs::create_dir_all(assets.join("empty")).unwrap();
    fs::write(assets.join("bg/park.png"), [0x89, b'P', b'N', b'G', 0, 1, 2]).unwrap();
    fs::write(assets.join("live2d/kasumi/kasumi.model3.json"), "{}").unwrap();
    fs::write(assets.join("live2d/kasumi/motions/wave.motion3.json"), "{}").unwrap();

    let src = "background(\"bg/park.png\")\nlet kasumi = Character(\"Kasumi\", \"live2d/kasumi\")\nkasumi.motion(\"wave\")\n";
    let mut diags = DiagnosticSet::new();
    let options = BuildOptions::for_locale(Locale::Jp).with_asset_folder(&assets);
    let ir = build_ir(&[Phase::new("Main.zeile", src)], &options, &mut diags)
        .unwrap_or_else(|| panic!("{diags:?}"));
    assert!(diags.is_empty(), "{diags:?}");

    let sar = archive::pack(&bin::encode(&ir), Some(&assets)).unwrap();
    let out = dir.path().join("out");
    archive::extract(&sar, &out).unwrap();

    let story = bin::load(&out.join(archive::STORY_ENTRY)).unwrap();
    assert_eq!(story, ir);
    assert_eq!(tree(&out.join(archive::ASSETS_DIR)), tree(&assets));
    assert_eq!(archive::story_bytes(&sar).unwrap(), bin::encode(&ir));
}

#[test]
fn corrupt_archive_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let assets = dir.path().join("Assets");
    fs::create_dir_all(&assets).unwrap();
    fs::write(assets.join("a.txt"), "hello").unwrap();

    let mut sar = archive::pack(b"story", Some(&assets)).unwrap();
    let middle = sar.len() / 2;
    sar[middle] ^= 0xff;

    let out = dir.path().join("out");
    assert!(archive::extract(&sar, &out).is_err());
    assert!(!out.exists());

    assert!(archive::extract(&sar[..10], &out).is_err());
    assert!(!out.exists());
}
