//! Read-only textual dumps of a `StoryIR` for debugging.
//!
//! `plain_text` is an assembler-style listing; `sirius` is a JSON document in
//! which jump targets and function entries are named labels instead of raw
//! addresses, so two builds can be diffed without address noise.

use std::collections::BTreeMap;
use std::fmt::{self, Write};

use serde_json::{Value, json};

use crate::processor::ir::{FORMAT_VERSION, Instruction, StoryIR};

pub fn plain_text(ir: &StoryIR) -> String {
    let mut out = String::new();
    // Formatting into a String cannot fail.
    let _ = write_plain(ir, &mut out);
    out
}

fn write_plain(ir: &StoryIR, out: &mut String) -> fmt::Result {
    let meta = &ir.metadata;
    writeln!(out, "; story {:?} ({})", meta.project_name, meta.locale)?;
    if !meta.author.is_empty() {
        writeln!(out, "; author {:?}", meta.author)?;
    }
    writeln!(out, "; phases: {}", ir.phases.join(", "))?;
    writeln!(out, "; globals: {}", ir.globals)?;

    writeln!(out, "\n; strings")?;
    for (i, s) in ir.strings.iter().enumerate() {
        writeln!(out, ";   #{i:<3} {s:?}")?;
    }
    writeln!(out, "\n; assets")?;
    for (i, a) in ir.assets.iter().enumerate() {
        writeln!(out, ";   #{i:<3} {:<12} {}", a.kind.name(), a.path)?;
    }
    writeln!(out, "\n; functions")?;
    for (i, f) in ir.functions.iter().enumerate() {
        writeln!(
            out,
            ";   #{i:<3} {}/{} entry {:04} locals {}",
            f.name, f.arity, f.entry, f.locals
        )?;
    }

    writeln!(out)?;
    let labels = labels(ir);
    for (pc, ins) in ir.code.iter().enumerate() {
        if let Some(label) = labels.get(&(pc as u32)) {
            writeln!(out, "{label}:")?;
        }
        let loc = ir.source_loc(pc).unwrap_or_default();
        let phase = ir.phases.get(loc.phase as usize).map_or("?", String::as_str);
        let source = format!("{phase}:{}", loc.line);
        let operands = operands(ir, ins, &labels);
        writeln!(
            out,
            "  {pc:04}  {source:<20} {:<18} {}",
            ins.mnemonic(),
            operands.join(" ")
        )?;
    }
    Ok(())
}

/// `L<n>` names for every address something jumps or calls to.
fn labels(ir: &StoryIR) -> BTreeMap<u32, String> {
    let mut targets: Vec<u32> = ir
        .code
        .iter()
        .flat_map(Instruction::targets)
        .chain(ir.functions.iter().map(|f| f.entry))
        .collect();
    targets.sort_unstable();
    targets.dedup();
    targets
        .into_iter()
        .enumerate()
        .map(|(i, addr)| (addr, format!("L{i}")))
        .collect()
}

fn label_of(labels: &BTreeMap<u32, String>, addr: u32) -> String {
    labels
        .get(&addr)
        .cloned()
        .unwrap_or_else(|| format!("@{addr}"))
}

fn operands(ir: &StoryIR, ins: &Instruction, labels: &BTreeMap<u32, String>) -> Vec<String> {
    use Instruction as I;
    match ins {
        I::PushInt(v) => vec![v.to_string()],
        I::PushBool(b) => vec![b.to_string()],
        I::PushString(s) => vec![
            format!("#{s}"),
            format!("{:?}", ir.strings.get(*s as usize).map_or("", String::as_str)),
        ],
        I::PushAsset(a) => match ir.assets.get(*a as usize) {
            Some(asset) => vec![format!("#{a}"), asset.path.clone()],
            None => vec![format!("#{a}")],
        },
        I::PushPosition(p) => vec![p.name().to_string()],
        I::LoadGlobal(x) | I::StoreGlobal(x) => vec![format!("g{x}")],
        I::LoadLocal(x) | I::StoreLocal(x) => vec![format!("l{x}")],
        I::Arith(_) => Vec::new(),
        I::Jump(t) | I::JumpUnless(t) => vec![label_of(labels, *t)],
        I::Call { function, argc } => {
            let name = ir
                .functions
                .get(*function as usize)
                .map_or("?", |f| f.name.as_str());
            vec![format!("{name}/{argc}")]
        }
        I::Choice(options) => options
            .iter()
            .map(|o| {
                let label = ir.strings.get(o.label as usize).map_or("", String::as_str);
                format!("{label:?}->{}", label_of(labels, o.target))
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// JSON dump with symbolic labels.
pub fn sirius(ir: &StoryIR) -> String {
    let labels = labels(ir);

    let code: Vec<Value> = ir
        .code
        .iter()
        .enumerate()
        .map(|(pc, ins)| {
            let loc = ir.source_loc(pc).unwrap_or_default();
            let mut entry = json!({
                "op": ins.mnemonic(),
                "args": operands(ir, ins, &labels),
                "phase": loc.phase,
                "line": loc.line,
            });
            if let Some(label) = labels.get(&(pc as u32)) {
                entry["label"] = json!(label);
            }
            entry
        })
        .collect();

    let doc = json!({
        "format": "sirius",
        "version": FORMAT_VERSION,
        "metadata": serde_json::to_value(&ir.metadata).unwrap_or(Value::Null),
        "phases": ir.phases,
        "strings": ir.strings,
        "assets": ir.assets.iter().map(|a| json!({
            "kind": a.kind.name(),
            "path": a.path,
        })).collect::<Vec<_>>(),
        "functions": ir.functions.iter().map(|f| json!({
            "name": f.name,
            "entry": label_of(&labels, f.entry),
            "arity": f.arity,
            "locals": f.locals,
        })).collect::<Vec<_>>(),
        "globals": ir.globals,
        "code": code,
    });
    serde_json::to_string_pretty(&doc).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DiagnosticSet, Locale};
    use crate::processor::{BuildOptions, Phase, build_ir};

    fn sample() -> StoryIR {
        let src = "\
func greet(who: Character) {
    who.say(\"Hello\")
}
let arisa = Character(\"Arisa\", \"live2d/arisa\")
choice {
    \"Greet\" {
        greet(arisa)
    }
    \"Skip\" {
    }
}
";
        let mut diags = DiagnosticSet::new();
        build_ir(
            &[Phase::new("Main.zeile", src)],
            &BuildOptions::for_locale(Locale::En),
            &mut diags,
        )
        .unwrap_or_else(|| panic!("{diags:?}"))
    }

    #[test]
    fn test_plain_text_listing() {
        let ir = sample();
        let text = plain_text(&ir);
        assert!(text.contains("; phases: Main.zeile"));
        assert!(text.contains("greet/1 entry 0001 locals 1"));
        assert!(text.contains("\"Greet\"->L"));
        assert!(text.contains("Main.zeile:4"));
        assert_eq!(text.lines().filter(|l| l.starts_with("  0")).count(), ir.code.len());
    }

    #[test]
    fn test_sirius_uses_labels() {
        let ir = sample();
        let doc: Value = serde_json::from_str(&sirius(&ir)).unwrap();
        assert_eq!(doc["format"], "sirius");
        assert_eq!(doc["functions"][0]["entry"], "L0");
        assert_eq!(doc["code"][1]["label"], "L0");
        assert_eq!(doc["code"][0]["op"], "jump");
        assert_eq!(doc["code"].as_array().unwrap().len(), ir.code.len());
        assert_eq!(doc["metadata"]["locale"], "en");
    }

    #[test]
    fn test_dumps_do_not_touch_the_ir() {
        let ir = sample();
        let before = ir.clone();
        let _ = plain_text(&ir);
        let _ = sirius(&ir);
        assert_eq!(ir, before);
    }
}
