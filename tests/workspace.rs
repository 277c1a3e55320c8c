use std::fs;

use zeile::model::Locale;
use zeile::processor::{PlayerEvent, PlayerState};
use zeile::project::Project;
use zeile::workspace::{BuildQueue, RunRegistry, Workspace};

#[test]
fn build_pack_open_and_run() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = Workspace::new(dir.path().join("Derived"), dir.path().join("Temp"));
    let mut project = Project::create(dir.path(), "Festival", Locale::En).unwrap();
    let assets = project.asset_dir().unwrap();
    fs::create_dir_all(assets.join("bg")).unwrap();
    fs::write(assets.join("bg/stage.png"), b"png").unwrap();
    project
        .add_phase(
            "Stage.zeile",
            "background(\"bg/stage.png\")\nchoice {\n    \"Cheer\" {\n        narrate(\"Encore!\")\n    }\n}\n",
        )
        .unwrap();

    let mut queue = BuildQueue::new(workspace.clone());
    let report = queue.submit(project.clone()).wait().unwrap();
    assert!(report.succeeded(), "{:?}", report.diagnostics);
    assert_eq!(report.warnings(), 0);

    let sar = dir.path().join("Festival.sar");
    assert!(workspace.pack(&project, &sar).unwrap().succeeded());

    let story = workspace.open_story(&sar).unwrap();
    let extracted = story.extraction_dir().unwrap().to_path_buf();
    let stage = story.asset_root.clone().unwrap().join("bg/stage.png");
    assert_eq!(fs::read(&stage).unwrap(), b"png");

    let mut runs = RunRegistry::new();
    let player = runs.start(project.name(), story);
    assert_eq!(
        player.advance().unwrap(),
        PlayerEvent::Narration {
            text: "Once upon a time...".into()
        }
    );
    let PlayerEvent::Background { image } = player.advance().unwrap() else {
        panic!("expected the background");
    };
    assert_eq!(image.display_path(), stage.display().to_string());
    assert_eq!(
        player.advance().unwrap(),
        PlayerEvent::Choice {
            options: vec!["Cheer".into()]
        }
    );
    player.choose(0).unwrap();
    assert_eq!(
        player.advance().unwrap(),
        PlayerEvent::Narration {
            text: "Encore!".into()
        }
    );
    assert_eq!(player.advance().unwrap(), PlayerEvent::Finished);
    assert_eq!(player.state(), &PlayerState::Finished);

    assert!(runs.stop(project.name()));
    assert!(!extracted.exists());
}
