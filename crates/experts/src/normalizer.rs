use regex::Regex;
use std::sync::LazyLock;

static PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[.,!?;:'"()\[\]]"#).expect("static regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("static regex"));

/// Maps entity name variants onto one canonical form per document.
pub struct EntityNormalizer {
    /// (normalized variant, canonical name), in first-seen order
    aliases: Vec<(String, String)>,
}

impl EntityNormalizer {
    pub fn new() -> Self {
        Self {
            aliases: Vec::new(),
        }
    }

    /// Lowercase, strip punctuation, collapse spaces, then resolve aliases.
    pub fn normalize(&mut self, name: &str) -> String {
        let lowered = name.trim().to_lowercase();
        let stripped = PUNCTUATION.replace_all(&lowered, "");
        let normalized = WHITESPACE.replace_all(stripped.trim(), " ").to_string();

        if normalized.is_empty() {
            return normalized;
        }

        if let Some((_, canonical)) = self.aliases.iter().find(|(variant, _)| *variant == normalized) {
            return canonical.clone();
        }

        // First similar entity wins, so the result does not depend on map order
        let canonical = self
            .aliases
            .iter()
            .find(|(variant, _)| are_similar(&normalized, variant))
            .map(|(_, canonical)| canonical.clone())
            .unwrap_or_else(|| normalized.clone());

        self.aliases.push((normalized, canonical.clone()));
        canonical
    }

    pub fn aliases(&self) -> &[(String, String)] {
        &self.aliases
    }
}

impl Default for EntityNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

fn are_similar(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }

    let words_a: Vec<&str> = a.split_whitespace().collect();
    let words_b: Vec<&str> = b.split_whitespace().collect();

    // Whole-word containment ("zeta" within "zeta prospect"), never on fragments
    let (short, long) = if words_a.len() <= words_b.len() {
        (&words_a, &words_b)
    } else {
        (&words_b, &words_a)
    };
    if short.len() < long.len() && short.iter().all(|w| w.len() >= 3 && long.contains(w)) {
        return true;
    }

    if words_a.len() > 1 && words_b.len() > 1 {
        let common = words_a.iter().filter(|w| words_b.contains(w)).count();
        let total = words_a.len().max(words_b.len());
        return common as f64 / total as f64 > 0.7;
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization() {
        let mut normalizer = EntityNormalizer::new();

        assert_eq!(normalizer.normalize("Tizi Fault"), "tizi fault");
        assert_eq!(normalizer.normalize("Tizi Fault."), "tizi fault");
        assert_eq!(normalizer.normalize("  TIZI   fault  "), "tizi fault");
    }

    #[test]
    fn test_alias_resolution() {
        let mut normalizer = EntityNormalizer::new();

        let n1 = normalizer.normalize("Zeta");
        let n2 = normalizer.normalize("Zeta Prospect");
        assert_eq!(n1, n2);
        assert_eq!(normalizer.aliases().len(), 2);
    }

    #[test]
    fn test_short_fragments_not_merged() {
        let mut normalizer = EntityNormalizer::new();

        let gold = normalizer.normalize("Au");
        let basin = normalizer.normalize("Au River Basin");
        assert_ne!(gold, basin);
    }

    #[test]
    fn test_distinct_names_kept() {
        let mut normalizer = EntityNormalizer::new();

        assert_ne!(
            normalizer.normalize("Anti-Atlas"),
            normalizer.normalize("Bou Azzer inlier")
        );
    }
}
