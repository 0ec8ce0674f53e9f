use super::ActivityCode;

fn contains_any(text: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| text.contains(needle))
}

fn has_word(text: &str, word: &str) -> bool {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .any(|token| token == word)
}

fn mentions_export(desc: &str) -> bool {
    contains_any(desc, &["exporta", "exterior"])
}

fn substitution_negated(desc: &str) -> bool {
    contains_any(desc, &["sem st", "sem substituicao"])
}

/// ICMS substitution (`st`, `substituicao`) that is not explicitly negated.
fn mentions_substitution(desc: &str) -> bool {
    !substitution_negated(desc) && (has_word(desc, "st") || desc.contains("substituicao"))
}

/// ISS retention or substitution that is not explicitly negated.
fn mentions_retention(desc: &str) -> bool {
    let marked = has_word(desc, "st") || contains_any(desc, &["retencao", "retido", "substituicao"]);
    marked && !contains_any(desc, &["sem retencao", "sem st", "sem substituicao"])
}

fn other_municipality(desc: &str) -> bool {
    contains_any(
        desc,
        &["outro municipio", "outro(s) municipio", "outros municipios"],
    )
}

fn code(value: u8) -> Option<ActivityCode> {
    ActivityCode::new(value)
}

/// Keyword decision tree per annex, applied to a normalized description.
/// `None` means no rule applies and the caller falls back to fuzzy matching.
pub(crate) fn rule_for(annex: u16, desc: &str) -> Option<ActivityCode> {
    match annex {
        1 => {
            if desc.contains("exterior") {
                code(3)
            } else if substitution_negated(desc) {
                code(1)
            } else if mentions_substitution(desc) {
                code(2)
            } else {
                code(1)
            }
        }
        2 => {
            if desc.contains("exterior") {
                code(6)
            } else if mentions_substitution(desc) {
                code(5)
            } else {
                code(4)
            }
        }
        3 => {
            let fator_r = !desc.contains("nao sujeitos");
            if mentions_export(desc) {
                return code(if fator_r { 29 } else { 30 });
            }
            service_code(fator_r, mentions_retention(desc), other_municipality(desc))
        }
        4 => {
            if mentions_export(desc) {
                code(31)
            } else if mentions_retention(desc) {
                code(18)
            } else if other_municipality(desc) {
                code(16)
            } else {
                code(17)
            }
        }
        5 | 105 => {
            if mentions_export(desc) {
                return code(if desc.contains("construcao") { 32 } else { 30 });
            }
            let fator_r = desc.contains("fator r") && !desc.contains("nao");
            service_code(fator_r, mentions_retention(desc), other_municipality(desc))
        }
        6 => {
            let transport = desc.contains("transport");
            if mentions_export(desc) {
                return code(if transport { 38 } else { 39 });
            }
            let negated =
                contains_any(desc, &["sem st", "sem retencao", "sem reten", "sem substituicao"]);
            if !negated && (mentions_substitution(desc) || mentions_retention(desc)) {
                code(if transport { 35 } else { 37 })
            } else {
                code(if transport { 34 } else { 36 })
            }
        }
        _ => None,
    }
}

/// Domestic services split by fator r, ISS retention and ISS municipality.
fn service_code(fator_r: bool, retention: bool, other_municipality: bool) -> Option<ActivityCode> {
    let value = match (fator_r, retention, other_municipality) {
        (true, true, _) => 12,
        (true, false, true) => 10,
        (true, false, false) => 11,
        (false, true, _) => 15,
        (false, false, true) => 13,
        (false, false, false) => 14,
    };
    code(value)
}
