//! Text normalization shared by the rewriter fallback, the router, the
//! guardrail and the lexical index.

/// Lowercase, trim and collapse internal whitespace.
///
/// This is the form a raw query takes when the rewrite capability is
/// unavailable.
pub fn normalize_query(raw: &str) -> String {
    raw.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Replace Spanish/Latin diacritics with their base letter.
///
/// Covers the accented letters that appear in the guide corpus; anything
/// else passes through unchanged.
pub fn fold_accents(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'ö' | 'ō' => 'o',
            'ú' | 'ù' | 'û' | 'ü' | 'ū' => 'u',
            'ñ' => 'n',
            'ç' => 'c',
            'Á' | 'À' | 'Â' | 'Ä' => 'A',
            'É' | 'È' | 'Ê' | 'Ë' => 'E',
            'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
            'Ó' | 'Ò' | 'Ô' | 'Ö' | 'Ō' => 'O',
            'Ú' | 'Ù' | 'Û' | 'Ü' | 'Ū' => 'U',
            'Ñ' => 'N',
            'Ç' => 'C',
            other => other,
        })
        .collect()
}

/// Split text into lowercase, accent-folded alphanumeric tokens.
///
/// `"¡Tokio, Japón!"` becomes `["tokio", "japon"]`.
pub fn keyword_tokens(text: &str) -> Vec<String> {
    let folded = fold_accents(&text.to_lowercase());
    folded
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_query() {
        assert_eq!(normalize_query("  Sitios   JAPO\tMadrid \n"), "sitios japo madrid");
        assert_eq!(normalize_query(""), "");
    }

    #[test]
    fn test_fold_accents() {
        assert_eq!(fold_accents("Japón España Kyōto"), "Japon Espana Kyoto");
    }

    #[test]
    fn test_keyword_tokens() {
        assert_eq!(keyword_tokens("¡Tokio, Japón!"), vec!["tokio", "japon"]);
        assert_eq!(
            keyword_tokens("Python 3.12 es GENIAL"),
            vec!["python", "3", "12", "es", "genial"]
        );
        assert!(keyword_tokens("¿?!").is_empty());
    }
}
