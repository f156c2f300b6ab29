//! Built-in rules for the Codex desktop webview bundle.
//!
//! The bundle is minified, so local identifiers differ between builds. Every
//! rule captures the identifiers it touches and echoes them back through its
//! render function. Re-review these patterns after each app update.

use crate::engine::{PatchRule, Replacement, RuleError, RuleMatch};

/// An ordered set of rules applied together in one run.
#[derive(Debug, Clone)]
pub struct RuleSet {
    pub name: String,
    pub description: Option<String>,
    pub rules: Vec<PatchRule>,
}

impl RuleSet {
    pub fn builtin() -> Result<Self, RuleError> {
        Ok(Self {
            name: "codex-webview".to_string(),
            description: Some(
                "Keep reasoning items visible and stop auto-collapsing exploration and reasoning panes"
                    .to_string(),
            ),
            rules: builtin()?,
        })
    }
}

/// The five webview rules, in application order.
pub fn builtin() -> Result<Vec<PatchRule>, RuleError> {
    Ok(vec![
        // Reasoning items used to be buffered into the exploration group;
        // close the group on them instead. Older bundles that close with
        // `pt("explored")` in place of the push are not recognized: that
        // rewrite would match its own precondition. Such bundles fail this
        // rule with the precondition absent.
        PatchRule::new(
            "exploration_continuation_drop_reasoning",
            r#"if\((?P<item>\w+)\.type==="reasoning"\)\{(?P<buf>\w+)&&(?P=buf)\.push\((?P=item)\);continue\}(?P=buf)&&(?P<close>\w+)\("explored"\)"#,
            Replacement::render(&["item", "buf", "close"], render_drop_reasoning),
        )?
        .with_patched(
            r#"if\(\w+\.type==="reasoning"\)\{(?P<buf>\w+)&&(?P<close>\w+)\("explored"\)\}(?P=buf)&&(?P=close)\("explored"\)"#,
        )?,
        PatchRule::new(
            "exploration_no_autocollapse_on_finish",
            r#"(?P<cb>\w+)=\(\)=>\{(?P<setter>\w+)\((?P<cond>\w+)\?"preview":"collapsed"\)\}"#,
            Replacement::render(&["cb", "setter", "cond"], render_exploration_preview),
        )?
        .with_patched(r#"\w+=\(\)=>\{\w+&&\w+\("preview"\)\}"#)?,
        PatchRule::new(
            "show_reasoning_items_in_log",
            r#"(?P<render>\w+)=(?P<child>\w+),(?P<item>\w+)\.type==="reasoning"&&\((?P=render)=null\)"#,
            Replacement::render(&["render", "child"], render_keep_child),
        )?
        .with_patched(
            r"(?P<render>\w+)=(?P<child>\w+)\s*\}\s*let\s+\w+;\s*\w+\[\d+\]!==(?P=render)",
        )?,
        PatchRule::new(
            "reasoning_no_autocollapse_on_finish",
            r"if\(!(?P<stream>\w+)\)\{(?P<setter>\w+)\(!1\);return\}const (?P<el>\w+)=(?P<ref>\w+)\.current;",
            Replacement::render(&["stream", "el", "ref"], render_skip_collapse),
        )?
        .with_patched(r"if\(!\w+\)\{return\}const \w+=\w+\.current;")?,
        PatchRule::new(
            "reasoning_autoscroll_user_scroll_flag",
            r"const (?P<el>\w+)=(?P<ref>\w+)\.current;(?P=el)&&\((?:(?P=el)\.scrollHeight-(?P=el)\.clientHeight-(?P=el)\.scrollTop<16\)&&\()?(?P=el)\.scrollTop=(?P=el)\.scrollHeight\)",
            Replacement::render(&["el", "ref"], render_autoscroll_flag),
        )?
        .with_patched(r"__codexReasoningAutoScrollInit")?,
    ])
}

fn render_drop_reasoning(m: &RuleMatch<'_>) -> String {
    let (item, buf, close) = (m.get("item"), m.get("buf"), m.get("close"));
    format!(
        r#"if({item}.type==="reasoning"){{{buf}&&{close}("explored")}}{buf}&&{close}("explored")"#
    )
}

fn render_exploration_preview(m: &RuleMatch<'_>) -> String {
    let (cb, setter, cond) = (m.get("cb"), m.get("setter"), m.get("cond"));
    format!(r#"{cb}=()=>{{{cond}&&{setter}("preview")}}"#)
}

fn render_keep_child(m: &RuleMatch<'_>) -> String {
    format!("{}={}", m.get("render"), m.get("child"))
}

fn render_skip_collapse(m: &RuleMatch<'_>) -> String {
    let (stream, el, reference) = (m.get("stream"), m.get("el"), m.get("ref"));
    format!("if(!{stream}){{return}}const {el}={reference}.current;")
}

/// Only follow new output while the user is pinned to the bottom; scrolling
/// up clears the flag until they return.
fn render_autoscroll_flag(m: &RuleMatch<'_>) -> String {
    let (el, reference) = (m.get("el"), m.get("ref"));
    format!(
        concat!(
            "const {el}={reference}.current;",
            "{el}&&(!{el}.__codexReasoningAutoScrollInit&&(",
            "{el}.__codexReasoningAutoScrollInit=1,",
            "{el}.__codexReasoningAutoScrollEnabled=1,",
            r#"{el}.addEventListener("scroll",()=>{{"#,
            "{el}.__codexReasoningAutoScrollEnabled=",
            "{el}.scrollHeight-{el}.clientHeight-{el}.scrollTop<16",
            "}},{{passive:!0}})",
            "),",
            "{el}.__codexReasoningAutoScrollEnabled&&({el}.scrollTop={el}.scrollHeight))",
        ),
        el = el,
        reference = reference,
    )
}
