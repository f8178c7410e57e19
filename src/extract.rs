//! Keyword-anchored product name extraction from raw OCR text

/// Labels that precede a product name on a shipping label, tried in order
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "상품명",
    "제품명",
    "상품이름",
    "제품이름",
    "품명",
    "Product Name",
    "Product",
    "Name",
    "상품",
    "제품",
];

/// Accepted values are strictly shorter than this many characters
const MAX_VALUE_CHARS: usize = 100;

/// Outcome of one extraction pass
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExtractedField {
    pub value: String,
    pub found: bool,
}

impl ExtractedField {
    fn found(value: String) -> Self {
        Self { value, found: true }
    }

    fn not_found() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone)]
pub struct FieldExtractor {
    keywords: Vec<String>,
}

impl Default for FieldExtractor {
    fn default() -> Self {
        Self {
            keywords: DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

impl FieldExtractor {
    /// Use a custom anchor list. An empty list keeps the built-in anchors.
    pub fn with_keywords<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keywords: Vec<String> = keywords
            .into_iter()
            .map(Into::into)
            .filter(|k: &String| !k.is_empty())
            .collect();
        if keywords.is_empty() {
            Self::default()
        } else {
            Self { keywords }
        }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// First-match scan: lines top to bottom, anchors in order within a line.
    pub fn extract(&self, raw_text: &str) -> ExtractedField {
        for line in raw_text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            for keyword in &self.keywords {
                let Some(start) = line.find(keyword.as_str()) else {
                    continue;
                };
                let rest = &line[start + keyword.len()..];
                let value = clean_value(rest);
                let chars = value.chars().count();
                if chars > 0 && chars < MAX_VALUE_CHARS {
                    log::debug!("Matched keyword '{}' -> '{}'", keyword, value);
                    return ExtractedField::found(value.to_string());
                }
            }
        }
        ExtractedField::not_found()
    }
}

/// Strip the separator run after a label and any trailing whitespace
fn clean_value(rest: &str) -> &str {
    rest.trim_start_matches(|c: char| c == ':' || c == '-' || c == '=' || c.is_whitespace())
        .trim_end()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(text: &str) -> ExtractedField {
        FieldExtractor::default().extract(text)
    }

    #[test]
    fn test_first_qualifying_match_wins() {
        let result = extract("상품명: 원목 책상\nProduct: ignored");
        assert_eq!(result, ExtractedField::found("원목 책상".to_string()));
    }

    #[test]
    fn test_separator_run_and_trailing_space_stripped() {
        let result = extract("제품명---=  모던 소파  ");
        assert!(result.found);
        assert_eq!(result.value, "모던 소파");
    }

    #[test]
    fn test_length_boundary() {
        let ninety_nine = "가".repeat(99);
        let result = extract(&format!("상품명: {}", ninety_nine));
        assert!(result.found);
        assert_eq!(result.value.chars().count(), 99);

        let hundred = "가".repeat(100);
        let result = extract(&format!("상품명: {}", hundred));
        assert_eq!(result, ExtractedField::not_found());
    }

    #[test]
    fn test_no_keyword() {
        let raw = "브랜드: ABC\n재질: 패브릭";
        let result = extract(raw);
        assert!(!result.found);
        assert!(result.value.is_empty());
    }

    #[test]
    fn test_empty_capture_falls_through_to_later_lines() {
        let result = extract("품명:\n\n   \nProduct Name = Oak Table");
        assert_eq!(result.value, "Oak Table");
    }

    #[test]
    fn test_keyword_order_within_line() {
        // "Product Name" precedes "Name" in the anchor list
        let result = extract("Product Name: Lamp");
        assert_eq!(result.value, "Lamp");
        // "상품명" contains "상품", the longer anchor is tried first
        let result = extract("상품명 - 스탠드 조명");
        assert_eq!(result.value, "스탠드 조명");
    }

    #[test]
    fn test_scenario_label() {
        let result = extract("브랜드: ABC\n상품명: 3인 소파\n재질: 패브릭");
        assert_eq!(result.value, "3인 소파");
    }

    #[test]
    fn test_idempotent() {
        let extractor = FieldExtractor::default();
        let raw = "Name: chair\n상품: 의자";
        assert_eq!(extractor.extract(raw), extractor.extract(raw));
    }

    #[test]
    fn test_found_values_always_in_range() {
        let inputs = [
            "",
            "상품명",
            "상품명 :::",
            "Product: x",
            "제품 =  ",
            "Name -- a\nName -- b",
        ];
        for input in inputs {
            let result = extract(input);
            if result.found {
                let n = result.value.chars().count();
                assert!((1..=99).contains(&n), "{input:?} -> {result:?}");
            } else {
                assert!(result.value.is_empty(), "{input:?} -> {result:?}");
            }
        }
    }

    #[test]
    fn test_custom_keywords() {
        let extractor = FieldExtractor::with_keywords(["SKU"]);
        assert_eq!(extractor.extract("SKU: FUR-0042").value, "FUR-0042");
        assert!(!extractor.extract("상품명: 책상").found);

        let fallback = FieldExtractor::with_keywords(Vec::<String>::new());
        assert_eq!(fallback.keywords().len(), DEFAULT_KEYWORDS.len());
    }
}
