//! Attribute renderers: host hooks that turn scalars into text.

use std::error::Error;
use std::fmt::Write;

use html_escape::encode_double_quoted_attribute;

use crate::types::Scalar;

/// Converts a scalar of one [`ScalarKind`](crate::ScalarKind) to text.
///
/// The interpreter consults the renderer registered for a value's kind
/// before falling back to the value's `Display` form. `format` is the text
/// of the `format` option, if the expression had one.
pub trait AttributeRenderer: Send + Sync {
    fn render(
        &self,
        value: &Scalar,
        format: Option<&str>,
    ) -> Result<String, Box<dyn Error + Send + Sync>>;
}

impl<F> AttributeRenderer for F
where
    F: Fn(&Scalar, Option<&str>) -> Result<String, Box<dyn Error + Send + Sync>> + Send + Sync,
{
    fn render(
        &self,
        value: &Scalar,
        format: Option<&str>,
    ) -> Result<String, Box<dyn Error + Send + Sync>> {
        self(value, format)
    }
}

/// Renderer for strings supporting the formats `upper`, `lower`, `cap`,
/// `xml-encode` and `url-encode`. Unknown formats leave the text as is.
///
/// ```
/// use stg::{AttributeRenderer, Scalar, StringRenderer};
///
/// let text = StringRenderer.render(&Scalar::Str("a<b".into()), Some("xml-encode"));
/// assert_eq!(text.unwrap(), "a&lt;b");
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct StringRenderer;

impl AttributeRenderer for StringRenderer {
    fn render(
        &self,
        value: &Scalar,
        format: Option<&str>,
    ) -> Result<String, Box<dyn Error + Send + Sync>> {
        let text = value.to_string();
        Ok(match format {
            Some("upper") => text.to_uppercase(),
            Some("lower") => text.to_lowercase(),
            Some("cap") => capitalize(&text),
            Some("xml-encode") => encode_double_quoted_attribute(&text).into_owned(),
            Some("url-encode") => url_encode(&text),
            _ => text,
        })
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Percent-encode everything outside the unreserved set; spaces become `+`.
fn url_encode(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for byte in text.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'*' => {
                out.push(char::from(byte));
            }
            b' ' => out.push('+'),
            other => {
                let _ = write!(out, "%{other:02X}");
            }
        }
    }
    out
}
