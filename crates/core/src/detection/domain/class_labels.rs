use std::collections::BTreeMap;

/// Class-id to name table of a detection model.
///
/// Exported YOLO models carry their class names as a `names` metadata
/// entry written as a dict literal, e.g. `{0: 'fist', 1: 'palm'}`. Ids
/// missing from the table are named `class_{id}`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClassLabels {
    names: BTreeMap<usize, String>,
}

impl ClassLabels {
    pub fn new(names: BTreeMap<usize, String>) -> Self {
        Self { names }
    }

    /// Parses a `names` metadata value. Malformed entries are skipped, so a
    /// garbled value yields a partial (possibly empty) table.
    pub fn parse(raw: &str) -> Self {
        let body = raw.trim().trim_start_matches('{').trim_end_matches('}');
        let mut names = BTreeMap::new();
        let mut chars = body.chars().peekable();

        loop {
            skip_separators(&mut chars);
            let id: String = std::iter::from_fn(|| chars.next_if(char::is_ascii_digit)).collect();
            if id.is_empty() {
                // Not at an entry; resync on the next comma.
                if chars.by_ref().find(|&c| c == ',').is_none() {
                    break;
                }
                continue;
            }

            skip_separators(&mut chars);
            if chars.next_if_eq(&':').is_none() {
                continue;
            }
            skip_separators(&mut chars);

            let Some(quote) = chars.next_if(|&c| c == '\'' || c == '"') else {
                continue;
            };
            let mut name = String::new();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            name.push(escaped);
                        }
                    }
                    c if c == quote => {
                        closed = true;
                        break;
                    }
                    c => name.push(c),
                }
            }

            if let (true, Ok(id)) = (closed, id.parse::<usize>()) {
                names.insert(id, name);
            }
        }

        Self { names }
    }

    pub fn label(&self, class_id: usize) -> String {
        self.names
            .get(&class_id)
            .cloned()
            .unwrap_or_else(|| format!("class_{class_id}"))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

fn skip_separators(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) {
    while chars.next_if(|c| c.is_whitespace() || *c == ',').is_some() {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_parse_ultralytics_names() {
        let labels = ClassLabels::parse("{0: 'fist', 1: 'palm', 2: 'thumbs up'}");
        assert_eq!(labels.len(), 3);
        assert_eq!(labels.label(0), "fist");
        assert_eq!(labels.label(2), "thumbs up");
    }

    #[rstest]
    #[case(r#"{0: "it's", 1: 'ok'}"#, 0, "it's")]
    #[case(r"{0: 'a\'b'}", 0, "a'b")]
    #[case("{3:'x',7:'y'}", 7, "y")]
    #[case("{0: 'a', 1: 'b, c'}", 1, "b, c")]
    fn test_parse_quoting(#[case] raw: &str, #[case] id: usize, #[case] expected: &str) {
        assert_eq!(ClassLabels::parse(raw).label(id), expected);
    }

    #[rstest]
    #[case("")]
    #[case("{}")]
    #[case("not a dict")]
    #[case("{0: 'unterminated")]
    fn test_parse_garbage_is_empty(#[case] raw: &str) {
        assert!(ClassLabels::parse(raw).is_empty());
    }

    #[test]
    fn test_skips_malformed_entry() {
        let labels = ClassLabels::parse("{x: 'bad', 1: 'good'}");
        assert_eq!(labels.len(), 1);
        assert_eq!(labels.label(1), "good");
    }

    #[test]
    fn test_missing_id_falls_back() {
        assert_eq!(ClassLabels::default().label(4), "class_4");
    }
}
