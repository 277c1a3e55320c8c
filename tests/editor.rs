use std::time::Duration;

use zeile::editor::{
    Advice, AdvisoryRequest, AdvisoryWorker, HighlightStyle, fill_placeholder, highlight,
    next_placeholder,
};
use zeile::model::Locale;
use zeile::processor::{BuildOptions, complete_code};

const SCRIPT: &str = "\
let kasumi = Character(\"Kasumi\", \"live2d/kasumi\")
func greet(who: Character) {
    who.say(\"Hi\")
}
kasumi.show(Position.left)
greet(kasumi)
narrate(\"done\")
";

#[test]
fn every_completion_leaves_the_caret_in_bounds() {
    let len = SCRIPT.chars().count();
    let mut offered = 0;
    for index in 0..len {
        for item in complete_code(SCRIPT, index, Locale::En, None) {
            offered += 1;
            let caret = index + 1 + item.replacing_length;
            assert!(
                caret <= item.replaced_code.chars().count(),
                "index {index}: {:?}",
                item.display_name.text
            );
        }
    }
    assert!(offered > 0);
}

#[test]
fn accepted_completion_selects_its_first_placeholder() {
    let code = "let kasumi = Character(\"Kasumi\", \"m\")\nkasumi.sa";
    let index = code.chars().count() - 1;
    let items = complete_code(code, index, Locale::En, None);
    let say = items
        .iter()
        .find(|i| i.display_name.text == "say")
        .expect("say is offered");

    let insertion = index + 1;
    let range = next_placeholder(&say.replaced_code, insertion - 2).expect("a placeholder");
    let (filled, caret) = fill_placeholder(&say.replaced_code, range).unwrap();
    assert!(filled.ends_with("kasumi.say(text)"));
    assert_eq!(caret, filled.chars().count() - 1);
}

#[test]
fn highlighting_covers_keywords_and_strings() {
    let spans = highlight(SCRIPT);
    let styles: Vec<_> = spans.iter().map(|s| s.style).collect();
    assert_eq!(styles[0], HighlightStyle::Keyword);
    assert!(styles.contains(&HighlightStyle::String));
    assert!(spans.iter().all(|s| s.range.end <= SCRIPT.chars().count()));
}

#[test]
fn worker_reports_diagnostics_for_one_phase() {
    let worker = AdvisoryWorker::new();
    worker.submit(AdvisoryRequest::Diagnostics {
        preceding: Vec::new(),
        source: "let x = 1\nlet y = x +\n".into(),
        options: BuildOptions::for_locale(Locale::Jp),
    });
    let result = worker.recv_timeout(Duration::from_secs(10)).unwrap();
    let Advice::Diagnostics(diags) = result.advice else {
        panic!("expected diagnostics");
    };
    assert!(diags.iter().any(|d| d.line == 2 && d.severity.is_blocking()));
}
