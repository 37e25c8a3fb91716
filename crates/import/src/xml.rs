//! Minimal pull scanner over XML markup, enough to walk bank statement documents.
//! No DTD handling and no namespace resolution: prefixes are simply dropped.

use std::borrow::Cow;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum XmlEvent<'a> {
    Start { name: &'a str, self_closing: bool },
    End { name: &'a str },
    Text(Cow<'a, str>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct XmlSyntaxError {
    pub offset: usize,
    pub message: &'static str,
}

pub(crate) struct XmlScanner<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> XmlScanner<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src: src.trim_start_matches('\u{feff}'), pos: 0 }
    }

    fn error(&self, message: &'static str) -> XmlSyntaxError {
        XmlSyntaxError { offset: self.pos, message }
    }

    /// Advances past `terminator`, returning the text before it.
    fn take_until(&mut self, terminator: &str, message: &'static str) -> Result<&'a str, XmlSyntaxError> {
        let rest = &self.src[self.pos..];
        match rest.find(terminator) {
            Some(idx) => {
                let taken = &rest[..idx];
                self.pos += idx + terminator.len();
                Ok(taken)
            }
            None => Err(self.error(message)),
        }
    }

    /// Reads a start or end tag body up to its closing `>`, honoring quoted attribute values.
    fn take_tag(&mut self) -> Result<&'a str, XmlSyntaxError> {
        let rest = &self.src[self.pos..];
        let mut quote: Option<char> = None;
        for (idx, c) in rest.char_indices() {
            match (quote, c) {
                (Some(q), c) if c == q => quote = None,
                (Some(_), _) => {}
                (None, '"') | (None, '\'') => quote = Some(c),
                (None, '>') => {
                    self.pos += idx + 1;
                    return Ok(&rest[..idx]);
                }
                _ => {}
            }
        }
        Err(self.error("unterminated tag"))
    }
}

impl<'a> Iterator for XmlScanner<'a> {
    type Item = Result<XmlEvent<'a>, XmlSyntaxError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let rest = &self.src[self.pos..];
            if rest.is_empty() {
                return None;
            }

            if !rest.starts_with('<') {
                let end = rest.find('<').unwrap_or(rest.len());
                let raw = &rest[..end];
                self.pos += end;
                return Some(Ok(XmlEvent::Text(decode_entities(raw))));
            }

            if rest.starts_with("<!--") {
                self.pos += 4;
                if let Err(e) = self.take_until("-->", "unterminated comment") {
                    return Some(Err(e));
                }
                continue;
            }
            if rest.starts_with("<![CDATA[") {
                self.pos += 9;
                return Some(
                    self.take_until("]]>", "unterminated CDATA section")
                        .map(|t| XmlEvent::Text(Cow::Borrowed(t))),
                );
            }
            if rest.starts_with("<?") {
                self.pos += 2;
                if let Err(e) = self.take_until("?>", "unterminated processing instruction") {
                    return Some(Err(e));
                }
                continue;
            }
            if rest.starts_with("<!") {
                self.pos += 2;
                if let Err(e) = self.take_tag() {
                    return Some(Err(e));
                }
                continue;
            }

            self.pos += 1;
            let body = match self.take_tag() {
                Ok(body) => body,
                Err(e) => return Some(Err(e)),
            };

            if let Some(name) = body.strip_prefix('/') {
                return Some(Ok(XmlEvent::End { name: local_name(name.trim()) }));
            }

            let (body, self_closing) = match body.strip_suffix('/') {
                Some(b) => (b, true),
                None => (body, false),
            };
            let name = body.split(|c: char| c.is_whitespace()).next().unwrap_or_default();
            if name.is_empty() {
                return Some(Err(self.error("empty tag name")));
            }
            return Some(Ok(XmlEvent::Start { name: local_name(name), self_closing }));
        }
    }
}

fn local_name(qualified: &str) -> &str {
    qualified.rsplit(':').next().unwrap_or(qualified)
}

fn decode_entities(raw: &str) -> Cow<'_, str> {
    if !raw.contains('&') {
        return Cow::Borrowed(raw);
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let after = &rest[start..];
        let decoded = after.find(';').and_then(|end| {
            let entity = &after[1..end];
            let c = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            }?;
            Some((c, end + 1))
        });
        match decoded {
            Some((c, consumed)) => {
                out.push(c);
                rest = &after[consumed..];
            }
            None => {
                out.push('&');
                rest = &after[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events(src: &str) -> Vec<XmlEvent<'_>> {
        XmlScanner::new(src)
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
            .into_iter()
            .filter(|e| !matches!(e, XmlEvent::Text(t) if t.trim().is_empty()))
            .collect()
    }

    #[test]
    fn scans_nested_elements_with_attributes() {
        let ev = events(r#"<?xml version="1.0"?><a x="1>2"><b>hi</b><c/></a>"#);
        assert_eq!(
            ev,
            vec![
                XmlEvent::Start { name: "a", self_closing: false },
                XmlEvent::Start { name: "b", self_closing: false },
                XmlEvent::Text(Cow::Borrowed("hi")),
                XmlEvent::End { name: "b" },
                XmlEvent::Start { name: "c", self_closing: true },
                XmlEvent::End { name: "a" },
            ]
        );
    }

    #[test]
    fn strips_namespace_prefixes() {
        let ev = events("<ns2:Amt Ccy=\"EUR\">1.00</ns2:Amt>");
        assert_eq!(ev[0], XmlEvent::Start { name: "Amt", self_closing: false });
        assert_eq!(ev[2], XmlEvent::End { name: "Amt" });
    }

    #[test]
    fn skips_comments_and_keeps_cdata() {
        let ev = events("<a><!-- note --><![CDATA[x < y]]></a>");
        assert_eq!(ev[1], XmlEvent::Text(Cow::Borrowed("x < y")));
    }

    #[test]
    fn decodes_entities() {
        assert_eq!(decode_entities("M&amp;M &lt;3 &#228; &#xFC;"), "M&M <3 ä ü");
        assert_eq!(decode_entities("AT&T &unknown;"), "AT&T &unknown;");
    }

    #[test]
    fn unterminated_markup_is_an_error() {
        let result: Result<Vec<_>, _> = XmlScanner::new("<a><b").collect();
        assert!(result.is_err());
        let result: Result<Vec<_>, _> = XmlScanner::new("<a><!-- open").collect();
        assert!(result.is_err());
    }
}
