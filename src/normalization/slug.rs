use std::sync::OnceLock;

use regex::Regex;

fn non_alnum_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("static slug pattern"))
}

/// Latin accents seen in the catalog, folded to ASCII. Anything else
/// non-ASCII is dropped by the slug pattern.
fn fold_char(c: char) -> Option<&'static str> {
    Some(match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' => "a",
        'ç' | 'Ç' => "c",
        'è' | 'é' | 'ê' | 'ë' | 'È' | 'É' | 'Ê' | 'Ë' => "e",
        'ì' | 'í' | 'î' | 'ï' | 'Ì' | 'Í' | 'Î' | 'Ï' => "i",
        'ñ' | 'Ñ' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' => "o",
        'ù' | 'ú' | 'û' | 'ü' | 'Ù' | 'Ú' | 'Û' | 'Ü' => "u",
        'ý' | 'ÿ' | 'Ý' => "y",
        'œ' | 'Œ' => "oe",
        'æ' | 'Æ' => "ae",
        'ß' => "ss",
        _ => return None,
    })
}

/// ASCII slug safe for storage paths: accents folded, lower-cased, runs of
/// anything else collapsed to `-`. Never empty.
pub fn slugify(text: &str) -> String {
    let mut folded = String::with_capacity(text.len());
    for c in text.chars() {
        match fold_char(c) {
            Some(s) => folded.push_str(s),
            None => folded.push(c),
        }
    }
    let lowered = folded.trim().to_ascii_lowercase();
    let slug = non_alnum_runs().replace_all(&lowered, "-");
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "unnamed".to_string()
    } else {
        slug.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_accents_and_collapses_separators() {
        assert_eq!(slugify("Équipement  Médical"), "equipement-medical");
        assert_eq!(slugify("Lits & Brancards / Œdème"), "lits-brancards-oedeme");
        assert_eq!(slugify("  --Écrans 27\"--  "), "ecrans-27");
    }

    #[test]
    fn empty_or_symbol_only_names_get_placeholder() {
        assert_eq!(slugify(""), "unnamed");
        assert_eq!(slugify("***"), "unnamed");
        assert_eq!(slugify("日本"), "unnamed");
    }
}
