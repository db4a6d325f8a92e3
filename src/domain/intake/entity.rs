//! Heuristic entity extraction from free text.
//!
//! Every field has an ordered list of independent matcher strategies. The
//! first strategy yielding a candidate wins and, inside one strategy, the
//! longest candidate wins. Extraction never fails: no match is `None`.

use once_cell::sync::Lazy;
use regex::Regex;

const NAME_WORD: &str = r"[A-ZÁÂÃÉÊÍÓÔÕÚÇ][a-zãáàâéêíóôõúç]+";

/// Builds a proper-noun sequence pattern with `min..=max` extra words after the first.
///
/// Lowercase connectors (da, de, do, das, dos) are allowed between words.
fn name_sequence(min_extra: usize, max_extra: usize) -> String {
    format!(
        r"{w}(?:\s+(?:d[aeo]s?\s+)?{w}){{{min},{max}}}",
        w = NAME_WORD,
        min = min_extra,
        max = max_extra
    )
}

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static extraction pattern compiles")
}

static SUBJECT_INTRODUCTION: Lazy<Regex> = Lazy::new(|| {
    compile(&format!(
        r"(?i:me\s+chamo|sou\s+(?:o|a)|meu\s+nome\s+(?:é|e))\s+({})",
        name_sequence(1, 5)
    ))
});

static CAPITALIZED_SEQUENCE: Lazy<Regex> = Lazy::new(|| compile(&name_sequence(1, 5)));

static THREE_WORD_SEQUENCE: Lazy<Regex> = Lazy::new(|| compile(&name_sequence(2, 5)));

static TWO_WORD_SEQUENCE: Lazy<Regex> = Lazy::new(|| compile(&name_sequence(1, 1)));

static WHOLE_TEXT_NAME: Lazy<Regex> = Lazy::new(|| {
    compile(r"^\p{Lu}[\p{L}]+(?:\s+(?:(?i:d[aeo]s?)\s+)?\p{Lu}[\p{L}]+){1,5}$")
});

static COUNTERPART_KEYWORD: Lazy<Regex> = Lazy::new(|| {
    compile(&format!(
        r"(?i:\b(?:nome\s+completo|nome|representante|autorizo|autorizar|chama(?:-se)?|outorgado|para))[:\s]+(?:(?i:é|e)\s+)?({})",
        name_sequence(1, 5)
    ))
});

static COUNTERPART_RELATIVE: Lazy<Regex> = Lazy::new(|| {
    compile(&format!(
        r"(?i:\b(?:irmã|irmão|familiar|dela|dele))[:\s]+(?:(?i:é|e)\s+)?({})",
        name_sequence(1, 5)
    ))
});

/// Ordered national-ID patterns. Group 1 holds the candidate.
static ID_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        compile(r"(?i)cpf\s*[:\.]?\s*(\d[\d\.\s\-]*\d)"),
        compile(r"(?i)cpf.*?(\d{3}[\.\s]?\d{3}[\.\s]?\d{3}[\-\.\s]?\d{2})"),
        compile(r"(?:^|\D)(\d{3}[\.\s]?\d{3}[\.\s]?\d{3}[\-\.\s]?\d{2})(?:\D|$)"),
        compile(r"\b(\d{11})\b"),
    ]
});

static ADDRESS_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        compile(r"(?i)endereço\s*:?\s*([^\.,\n]+)"),
        compile(r"(?i)\b((?:rua|avenida)\s+[^\.,\n]+)"),
        compile(r"(?i)\bmora\s+(?:na\s+|no\s+|em\s+)?([^\.,\n]+)"),
    ]
});

/// Keeps only the ASCII digits of `text`.
pub fn digits_only(text: &str) -> String {
    text.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Formats an 11-digit national ID as `XXX.XXX.XXX-XX`.
///
/// Anything that is not exactly 11 digits is returned unchanged.
pub fn format_id(id: &str) -> String {
    let digits = digits_only(id);
    if digits.len() != 11 {
        return id.to_string();
    }
    format!(
        "{}.{}.{}-{}",
        &digits[0..3],
        &digits[3..6],
        &digits[6..9],
        &digits[9..11]
    )
}

/// True when the text's digits form an ID, or when any ID pattern matches.
pub fn looks_like_id(text: &str) -> bool {
    digits_only(text).len() == 11 || ID_PATTERNS.iter().any(|p| p.is_match(text))
}

/// True when two person names refer to the same person by containment.
pub fn names_related(a: &str, b: &str) -> bool {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a == b || a.contains(&b) || b.contains(&a)
}

fn word_count(candidate: &str) -> usize {
    candidate.split_whitespace().count()
}

/// Capitalized places and institutions that show up in questions and are never a person.
const NON_PERSON_NAMES: &[&str] = &[
    "são paulo",
    "rio de janeiro",
    "rio grande do sul",
    "rio grande do norte",
    "minas gerais",
    "santa catarina",
    "espírito santo",
    "mato grosso",
    "belo horizonte",
    "porto alegre",
    "distrito federal",
    "banco do brasil",
    "caixa econômica",
    "receita federal",
    "justiça federal",
    "previdência social",
    "poupa tempo",
    "detran",
    "cartório",
    "prefeitura",
];

/// True when the candidate names a place or an institution rather than a person.
fn names_place(candidate: &str) -> bool {
    let padded = format!(" {} ", candidate.to_lowercase());
    NON_PERSON_NAMES
        .iter()
        .any(|place| padded.contains(&format!(" {} ", place)))
}

fn person_candidate(candidate: &str) -> bool {
    word_count(candidate) >= 2 && !names_place(candidate)
}

/// Longest capture of `pattern` in `text` that passes `accept`.
fn longest_capture<F>(pattern: &Regex, text: &str, accept: F) -> Option<String>
where
    F: Fn(&str) -> bool,
{
    let group = if pattern.captures_len() > 1 { 1 } else { 0 };
    pattern
        .captures_iter(text)
        .filter_map(|caps| caps.get(group).map(|m| m.as_str().trim().to_string()))
        .filter(|candidate| accept(candidate))
        .fold(None, |best: Option<String>, candidate| match best {
            Some(b) if b.chars().count() >= candidate.chars().count() => Some(b),
            _ => Some(candidate),
        })
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let lower = word.to_lowercase();
            if matches!(lower.as_str(), "da" | "de" | "do" | "das" | "dos") {
                return lower;
            }
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Stateless extractor for the intake fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntityExtractor;

impl EntityExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extracts the client's own full name.
    ///
    /// `other_person` is a name already attributed to someone else in the
    /// session (the grantee); related candidates are rejected.
    pub fn subject_name(&self, text: &str, other_person: Option<&str>) -> Option<String> {
        let accept = |candidate: &str| {
            person_candidate(candidate)
                && other_person.map_or(true, |other| !names_related(candidate, other))
        };

        if let Some(name) = longest_capture(&SUBJECT_INTRODUCTION, text, accept) {
            return Some(name);
        }
        if let Some(name) = longest_capture(&CAPITALIZED_SEQUENCE, text, accept) {
            return Some(name);
        }

        let trimmed = text.trim();
        if WHOLE_TEXT_NAME.is_match(trimmed) {
            let name = title_case(trimmed);
            if accept(&name) {
                return Some(name);
            }
        }
        None
    }

    /// Extracts the grantee's full name, never returning the client's own name.
    pub fn counterpart_name(&self, text: &str, subject_name: Option<&str>) -> Option<String> {
        let accept = |candidate: &str| {
            person_candidate(candidate)
                && subject_name.map_or(true, |subject| !names_related(candidate, subject))
        };

        let strategies: [&Regex; 5] = [
            &COUNTERPART_KEYWORD,
            &COUNTERPART_RELATIVE,
            &THREE_WORD_SEQUENCE,
            &TWO_WORD_SEQUENCE,
            &CAPITALIZED_SEQUENCE,
        ];
        strategies
            .iter()
            .find_map(|pattern| longest_capture(pattern, text, accept))
    }

    /// Extracts a relative or beneficiary named after a family marker.
    pub fn beneficiary_name(&self, text: &str, subject_name: Option<&str>) -> Option<String> {
        longest_capture(&COUNTERPART_RELATIVE, text, |candidate| {
            person_candidate(candidate)
                && subject_name.map_or(true, |subject| !names_related(candidate, subject))
        })
    }

    /// All national IDs in the text, normalized to 11 digits, in strategy order.
    pub fn ids(&self, text: &str) -> Vec<String> {
        let mut found: Vec<String> = Vec::new();
        for pattern in ID_PATTERNS.iter() {
            for caps in pattern.captures_iter(text) {
                if let Some(m) = caps.get(1) {
                    let digits = digits_only(m.as_str());
                    if digits.len() == 11 && !found.contains(&digits) {
                        found.push(digits);
                    }
                }
            }
        }
        found
    }

    /// Extracts the client's national ID.
    pub fn subject_id(&self, text: &str) -> Option<String> {
        self.ids(text).into_iter().next()
    }

    /// Extracts the grantee's national ID, rejecting the client's own.
    pub fn counterpart_id(&self, text: &str, subject_id: Option<&str>) -> Option<String> {
        self.ids(text)
            .into_iter()
            .find(|id| subject_id.map_or(true, |own| digits_only(own) != *id))
    }

    /// Extracts an address fragment.
    pub fn address(&self, text: &str) -> Option<String> {
        ADDRESS_PATTERNS
            .iter()
            .find_map(|pattern| longest_capture(pattern, text, |candidate| !candidate.is_empty()))
    }
}
