//! Text folding and similarity for place-name matching

/// Fold a name for comparison: ASCII transliteration, lower case,
/// punctuation to spaces, whitespace collapsed.
///
/// `"KAB. MALANG"` and `"kab malang"` fold to the same key.
#[must_use]
pub fn fold_key(s: &str) -> String {
    let ascii = deunicode::deunicode(s).to_lowercase();
    let spaced: String = ascii
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect();
    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Similarity in `0.0..=1.0` between a folded query and a folded name.
///
/// Best of the whole-name score and the per-word scores, so "malng" is
/// close to "kab malang" as well as to "malang".
#[must_use]
pub fn similarity(query: &str, name: &str) -> f64 {
    let whole = strsim::normalized_levenshtein(query, name);
    name.split(' ')
        .map(|word| strsim::normalized_levenshtein(query, word))
        .fold(whole, f64::max)
}
