//! Text transform from an Arduino-style sketch to the host script.
//!
//! Pipeline: mask string literals and strip comments, extract the
//! brace-balanced `setup`/`loop` bodies, lift top-level declarations into a
//! prelude, then rewrite typed declarations, hardware constants and hardware
//! calls with patterns. Nothing here parses C; the interpreter reports
//! whatever the rewrite could not turn into valid host script.

use regex::Regex;
use std::sync::OnceLock;

/// Primitive declaration types, with optional qualifiers.
const TYPE_PATTERN: &str = r"(?:(?:static|const|volatile|unsigned|signed)\s+)*(?:bool|boolean|byte|char|int|long|short|float|double|word|size_t|String|u?int(?:8|16|32|64)_t)(?:\s+(?:int|long))?";

const CONSTANTS: [(&str, &str); 12] = [
    ("INPUT_PULLUP", "2"),
    ("OUTPUT", "1"),
    ("INPUT", "0"),
    ("HIGH", "1"),
    ("LOW", "0"),
    ("LED_BUILTIN", "13"),
    ("A0", "14"),
    ("A1", "15"),
    ("A2", "16"),
    ("A3", "17"),
    ("A4", "18"),
    ("A5", "19"),
];

// Rewrites of one declaration can expose the next one on the same line.
const MAX_DECLARATION_PASSES: usize = 16;

struct Rules {
    setup: Regex,
    loop_fn: Regex,
    declaration: Regex,
    static_local: Regex,
    for_init: Regex,
    cast: Regex,
    define: Regex,
    directive: Regex,
    constants: Vec<(Regex, &'static str)>,
    calls: Vec<(Regex, &'static str)>,
}

impl Rules {
    fn new() -> Result<Self, regex::Error> {
        let signature =
            |name: &str| Regex::new(&format!(r"\bvoid\s+{}\s*\(\s*(?:void\s*)?\)\s*\{{", name));

        let constants = CONSTANTS
            .iter()
            .map(|(name, value)| Ok((Regex::new(&format!(r"\b{}\b", name))?, *value)))
            .collect::<Result<Vec<_>, regex::Error>>()?;

        let calls = vec![
            (Regex::new(r"\bSerial\s*\.\s*println\s*\(")?, "hw.println("),
            (Regex::new(r"\bSerial\s*\.\s*print\s*\(")?, "hw.print("),
            (Regex::new(r"\bSerial\s*\.\s*begin\s*\(")?, "hw.serialBegin("),
            (
                Regex::new(r"\b(pinMode|digitalWrite|digitalRead|analogWrite|analogRead|millis)\s*\(")?,
                "hw.$1(",
            ),
            (Regex::new(r"\bdelay\s*\(")?, "await hw.delay("),
        ];

        Ok(Rules {
            setup: signature("setup")?,
            loop_fn: signature("loop")?,
            declaration: Regex::new(&format!(
                r"(?m)(^|[;{{}}])([ \t]*){}\s+([A-Za-z_]\w*)(\s*(?:[=,][^;]*)?);",
                TYPE_PATTERN
            ))?,
            static_local: Regex::new(&format!(
                r"(?m)(^|[;{{}}])[ \t]*static\s+{}\s+([A-Za-z_]\w*)\s*(?:=([^;,]*))?;",
                TYPE_PATTERN
            ))?,
            for_init: Regex::new(&format!(r"\bfor\s*\(\s*{}\s+", TYPE_PATTERN))?,
            cast: Regex::new(&format!(r"\(\s*{}\s*\)", TYPE_PATTERN))?,
            define: Regex::new(r"(?m)^[ \t]*#[ \t]*define[ \t]+([A-Za-z_]\w*)[ \t]+(.+?)[ \t]*$")?,
            directive: Regex::new(r"(?m)^[ \t]*#.*$")?,
            constants,
            calls,
        })
    }

    fn get() -> Option<&'static Rules> {
        static RULES: OnceLock<Option<Rules>> = OnceLock::new();
        RULES
            .get_or_init(|| match Rules::new() {
                Ok(rules) => Some(rules),
                Err(e) => {
                    tracing::error!("sketch rewrite rules failed to compile: {}", e);
                    None
                }
            })
            .as_ref()
    }
}

/// Transform a sketch into host script.
///
/// Source without a `void setup()` / `void loop()` signature is returned
/// unchanged, as is any sketch whose bodies cannot be extracted.
pub fn transpile(source: &str) -> String {
    match try_transpile(source) {
        Some(script) => script,
        None => source.to_string(),
    }
}

/// True when `source` carries a sketch signature and will be rewritten.
pub fn is_sketch(source: &str) -> bool {
    let Some(rules) = Rules::get() else {
        return false;
    };
    let masked = Masked::new(source);
    rules.setup.is_match(&masked.code) || rules.loop_fn.is_match(&masked.code)
}

fn try_transpile(source: &str) -> Option<String> {
    let rules = Rules::get()?;
    let normalized = source.replace("\r\n", "\n");
    let masked = Masked::new(&normalized);

    let setup = rules.setup.find(&masked.code);
    let loop_fn = rules.loop_fn.find(&masked.code);
    if setup.is_none() && loop_fn.is_none() {
        return None;
    }

    let setup_body = match setup {
        Some(m) => Some(balanced_body(&masked.code, m.end())?),
        None => None,
    };
    let loop_body = match loop_fn {
        Some(m) => Some(balanced_body(&masked.code, m.end())?),
        None => None,
    };

    let mut lines = prelude(rules, &top_level(&masked.code));
    let mut functions = Vec::new();
    for (name, body) in [("setup", setup_body), ("loop", loop_body)] {
        if let Some(body) = body {
            let body = lift_statics(rules, name, body, &mut lines)?;
            functions.push(format!("fn {}() {{{}}}\n", name, rewrite_body(rules, &body)));
        }
    }

    let mut out = String::new();
    for line in lines {
        out.push_str(&rewrite_expressions(rules, &line));
        out.push('\n');
    }
    for function in functions {
        out.push_str(&function);
    }

    Some(masked.restore(&out))
}

/// Text of a body whose opening brace ends just before `open`.
///
/// Counts depth so nested blocks are kept whole; `None` when unbalanced.
fn balanced_body(code: &str, open: usize) -> Option<&str> {
    let mut depth = 1usize;
    for (offset, c) in code[open..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&code[open..open + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Everything at brace depth zero. Braces themselves are kept so statement
/// boundaries survive.
fn top_level(code: &str) -> String {
    let mut depth = 0usize;
    let mut out = String::with_capacity(code.len());
    for c in code.chars() {
        match c {
            '{' => {
                if depth == 0 {
                    out.push(c);
                }
                depth += 1;
            }
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    out.push(c);
                }
            }
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

/// Global bindings, in source order: typed declarations and `#define`s.
fn prelude(rules: &Rules, top: &str) -> Vec<String> {
    let top = rules.cast.replace_all(top, "");
    let mut lines: Vec<(usize, String)> = Vec::new();

    for caps in rules.define.captures_iter(&top) {
        if let (Some(whole), Some(name), Some(value)) = (caps.get(0), caps.get(1), caps.get(2)) {
            lines.push((whole.start(), format!("let {} = {};", name.as_str(), value.as_str())));
        }
    }
    // Resume on each match's own `;` so `int a; int b;` yields both.
    let mut at = 0;
    while let Some(caps) = rules.declaration.captures_at(&top, at) {
        let (Some(whole), Some(name), Some(rest)) = (caps.get(0), caps.get(3), caps.get(4)) else {
            break;
        };
        lines.push((whole.start(), format!("let {}{};", name.as_str(), rest.as_str())));
        at = whole.end() - 1;
    }

    lines.sort_by_key(|(pos, _)| *pos);
    lines.into_iter().map(|(_, line)| line).collect()
}

/// Move `static` locals of `function` into the prelude as `function__name`
/// globals so they keep their value between calls.
fn lift_statics(
    rules: &Rules,
    function: &str,
    body: &str,
    lines: &mut Vec<String>,
) -> Option<String> {
    let mut lifted = Vec::new();
    let body = rules.static_local.replace_all(body, |caps: &regex::Captures| {
        let name = caps.get(2).map_or("", |m| m.as_str()).to_string();
        let global = format!("{}__{}", function, name);
        match caps.get(3) {
            Some(init) => {
                let init = rules.cast.replace_all(init.as_str().trim(), "");
                lines.push(format!("let {} = {};", global, init));
            }
            None => lines.push(format!("let {};", global)),
        }
        lifted.push((name, global));
        caps.get(1).map_or("", |m| m.as_str()).to_string()
    });

    let mut body = body.into_owned();
    for (name, global) in lifted {
        let pattern = Regex::new(&format!(r"\b{}\b", regex::escape(&name))).ok()?;
        body = pattern.replace_all(&body, global.as_str()).into_owned();
    }
    Some(body)
}

fn rewrite_body(rules: &Rules, body: &str) -> String {
    let body = rules.directive.replace_all(body, "");
    let body = rules.cast.replace_all(&body, "");
    let body = rules.for_init.replace_all(&body, "for (let ");

    let mut body = body.into_owned();
    for _ in 0..MAX_DECLARATION_PASSES {
        let next = rules.declaration.replace_all(&body, "${1}${2}let ${3}${4};");
        if next == body {
            break;
        }
        body = next.into_owned();
    }

    rewrite_expressions(rules, &body)
}

fn rewrite_expressions(rules: &Rules, text: &str) -> String {
    let mut text = text.to_string();
    for (pattern, value) in &rules.constants {
        text = pattern.replace_all(&text, *value).into_owned();
    }
    for (pattern, replacement) in &rules.calls {
        text = pattern.replace_all(&text, *replacement).into_owned();
    }
    text
}

/// Source with comments removed and every string or character literal
/// replaced by a numbered placeholder, so the rewrite patterns never look
/// inside literals.
struct Masked {
    code: String,
    literals: Vec<String>,
}

impl Masked {
    fn new(source: &str) -> Self {
        let chars: Vec<char> = source.chars().collect();
        let mut code = String::with_capacity(source.len());
        let mut literals = Vec::new();
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            match c {
                '/' if chars.get(i + 1) == Some(&'/') => {
                    while i < chars.len() && chars[i] != '\n' {
                        i += 1;
                    }
                }
                '/' if chars.get(i + 1) == Some(&'*') => {
                    i += 2;
                    while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                        if chars[i] == '\n' {
                            code.push('\n');
                        }
                        i += 1;
                    }
                    i += 2;
                }
                '"' | '\'' => {
                    let start = i;
                    i += 1;
                    while i < chars.len() && chars[i] != c && chars[i] != '\n' {
                        if chars[i] == '\\' {
                            i += 1;
                        }
                        i += 1;
                    }
                    i = (i + 1).min(chars.len());
                    literals.push(chars[start..i].iter().collect());
                    code.push(c);
                    code.push_str(&(literals.len() - 1).to_string());
                    code.push(c);
                }
                _ => {
                    code.push(c);
                    i += 1;
                }
            }
        }

        Masked { code, literals }
    }

    /// Put the original literals back into rewritten text.
    fn restore(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut chars = text.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '"' && c != '\'' {
                out.push(c);
                continue;
            }
            let mut index = String::new();
            while let Some(d) = chars.next_if(|d| d.is_ascii_digit()) {
                index.push(d);
            }
            let closed = chars.next_if_eq(&c).is_some();
            match index.parse::<usize>().ok().and_then(|n| self.literals.get(n)) {
                Some(literal) if closed => out.push_str(literal),
                _ => {
                    out.push(c);
                    out.push_str(&index);
                    if closed {
                        out.push(c);
                    }
                }
            }
        }
        out
    }
}
