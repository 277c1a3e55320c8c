use std::sync::Arc;

use zeile::model::{DiagnosticSet, Locale, Severity};
use zeile::processor::{BuildOptions, Phase, Player, PlayerEvent, StoryIR, build_ir};
use zeile::writer::bin;

const CAST: &str = "let kasumi = Character(\"Kasumi\", \"live2d/kasumi\")\n";
const SCENE: &str = "\
kasumi.say([\"jp\": \"おはよう\", \"en\": \"Good morning\"])
choice {
    \"Stay\" {
        narrate(\"They stay.\")
    }
    \"Leave\" {
        kasumi.hide()
    }
}
";

fn build(phases: &[(&str, &str)], locale: Locale) -> (Option<StoryIR>, DiagnosticSet) {
    let phases: Vec<Phase> = phases.iter().map(|(n, s)| Phase::new(n, s)).collect();
    let mut diags = DiagnosticSet::new();
    let ir = build_ir(&phases, &BuildOptions::for_locale(locale), &mut diags);
    (ir, diags)
}

#[test]
fn dangling_operator_blocks_the_build() {
    let (ir, diags) = build(&[("Main.zeile", "let x = 1\nlet y = x +\n")], Locale::Jp);
    assert!(ir.is_none());
    assert!(
        diags
            .for_file("Main.zeile")
            .iter()
            .any(|d| d.severity == Severity::Error && d.line == 2),
        "{diags:?}"
    );
}

#[test]
fn warnings_do_not_block_the_build() {
    let src = "func greet() {\n    var n = 1\n    narrate(\"hi\")\n}\ngreet()\n";
    let (ir, diags) = build(&[("Main.zeile", src)], Locale::Jp);
    assert!(ir.is_some(), "{diags:?}");
    assert!(!diags.has_errors());
    assert!(diags.count(Severity::Warning) >= 1);
}

#[test]
fn phases_link_in_order() {
    let (ir, diags) = build(&[("Cast.zeile", CAST), ("Scene.zeile", SCENE)], Locale::Jp);
    assert!(ir.is_some(), "{diags:?}");

    let (ir, diags) = build(&[("Scene.zeile", SCENE), ("Cast.zeile", CAST)], Locale::Jp);
    assert!(ir.is_none());
    let scene = diags.for_file("Scene.zeile");
    assert!(
        scene
            .iter()
            .any(|d| d.severity == Severity::Error && d.line == 1 && d.message.contains("kasumi")),
        "{scene:?}"
    );
}

#[test]
fn locale_picks_localized_text() {
    for (locale, expected) in [(Locale::Jp, "おはよう"), (Locale::En, "Good morning")] {
        let (ir, diags) = build(&[("Cast.zeile", CAST), ("Scene.zeile", SCENE)], locale);
        let ir = ir.unwrap_or_else(|| panic!("{diags:?}"));
        assert_eq!(ir.locale(), locale);
        let mut player = Player::new(Arc::new(ir), None);
        assert_eq!(
            player.advance().unwrap(),
            PlayerEvent::Dialogue {
                speaker: "Kasumi".into(),
                text: expected.into()
            }
        );
    }
}

#[test]
fn binary_round_trip_and_rejection() {
    let (ir, diags) = build(&[("Cast.zeile", CAST), ("Scene.zeile", SCENE)], Locale::En);
    let ir = ir.unwrap_or_else(|| panic!("{diags:?}"));

    let bytes = bin::encode(&ir);
    assert_eq!(bin::decode(&bytes).unwrap(), ir);
    assert_eq!(StoryIR::from_binary(&ir.binary_encoded()), Some(ir.clone()));

    assert!(StoryIR::from_binary(&bytes[..bytes.len() - 1]).is_none());
    assert!(StoryIR::from_binary(b"not a story at all").is_none());
    assert!(StoryIR::from_binary(&[]).is_none());

    let mut extended = bytes.clone();
    extended.push(0);
    assert!(StoryIR::from_binary(&extended).is_none());
}

#[test]
fn decoded_story_plays_the_same() {
    let (ir, diags) = build(&[("Cast.zeile", CAST), ("Scene.zeile", SCENE)], Locale::En);
    let ir = ir.unwrap_or_else(|| panic!("{diags:?}"));
    let decoded = bin::decode(&bin::encode(&ir)).unwrap();

    let mut events = Vec::new();
    for ir in [ir, decoded] {
        let mut player = Player::new(Arc::new(ir), None);
        let mut seen = Vec::new();
        loop {
            match player.advance().unwrap() {
                PlayerEvent::Finished => break,
                PlayerEvent::Choice { options } => {
                    assert_eq!(options, ["Stay", "Leave"]);
                    player.choose(1).unwrap();
                }
                event => seen.push(event),
            }
        }
        events.push(seen);
    }
    assert_eq!(events[0], events[1]);
    assert_eq!(
        events[0].last(),
        Some(&PlayerEvent::Hide {
            character: "Kasumi".into()
        })
    );
}
