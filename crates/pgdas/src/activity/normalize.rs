use regex::Regex;
use std::sync::OnceLock;
use unicode_normalization::UnicodeNormalization;

/// Generic legal boilerplate stripped from the start of a description, in order.
const BOILERPLATE_PREFIXES: &[&str] = &[
    r"(?i)^tabela\s+\d+\s*-",
    r"(?i)^receitas?\s+decorrentes?\s+(?:d[aeo]s?\s+)?",
    r"(?i)^servicos?\s+d[aeo]s?\s+",
    r"(?i)^servicos?\s+",
    r"(?i)^sujeitos?\s+a(?:os?)?\s+",
];

static PREFIX_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

fn prefix_patterns() -> &'static [Regex] {
    PREFIX_PATTERNS.get_or_init(|| {
        BOILERPLATE_PREFIXES
            .iter()
            .filter_map(|pattern| Regex::new(pattern).ok())
            .collect()
    })
}

/// Reduces a tax-table or catalog description to the comparable form used by
/// the rule engine and the fuzzy matcher: ASCII only, lowercase, single
/// spaces, boilerplate prefixes removed.
pub fn normalize_description(raw: &str) -> String {
    let ascii: String = raw.nfkd().filter(char::is_ascii).collect();

    let mut text = ascii.trim().to_string();
    for pattern in prefix_patterns() {
        text = pattern.replace(&text, "").trim_start().to_string();
    }

    let collapsed = text
        .replace('"', "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    collapsed
        .to_lowercase()
        .trim_matches(|c: char| c == ' ' || c == '-')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_diacritics_and_typographic_quotes() {
        assert_eq!(
            normalize_description("Sujeitos ao fator “r”, com retenção/substituição tributária de ISS"),
            "fator r, com retencao/substituicao tributaria de iss"
        );
    }

    #[test]
    fn strips_prefixes_in_sequence() {
        assert_eq!(
            normalize_description("Tabela 1 - Receitas decorrentes da revenda de mercadorias para o exterior"),
            "revenda de mercadorias para o exterior"
        );
        assert_eq!(
            normalize_description("Serviços de transporte coletivo municipal"),
            "transporte coletivo municipal"
        );
        assert_eq!(
            normalize_description("Serviços da área da construção civil"),
            "area da construcao civil"
        );
    }

    #[test]
    fn keeps_negated_fator_r_prefix() {
        assert_eq!(
            normalize_description("Não sujeitos ao fator “r” e tributados pelo Anexo III"),
            "nao sujeitos ao fator r e tributados pelo anexo iii"
        );
    }

    #[test]
    fn collapses_whitespace_and_trims_hyphens() {
        assert_eq!(
            normalize_description("  - Locação   de \"bens\"\tmóveis -  "),
            "locacao de bens moveis"
        );
    }
}
