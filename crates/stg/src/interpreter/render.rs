//! Writing values to the output.

use std::fmt;

use crate::diagnostic::{Diagnostic, ErrorKind};
use crate::interpreter::machine::{Env, Machine};
use crate::types::{Scalar, Value};

/// Output writer for one render, counting characters written.
///
/// Positions are measured in the top-level output: a scratch sink opened
/// while rendering to text starts at the position of the enclosing sink.
/// After the first write error the sink drops all further output.
pub(crate) struct Sink<'w> {
    out: &'w mut dyn fmt::Write,
    origin: usize,
    written: usize,
    failed: bool,
}

impl<'w> Sink<'w> {
    pub(crate) fn new(out: &'w mut dyn fmt::Write) -> Self {
        Self::starting_at(out, 0)
    }

    fn starting_at(out: &'w mut dyn fmt::Write, origin: usize) -> Self {
        Self {
            out,
            origin,
            written: 0,
            failed: false,
        }
    }

    /// Output position after the last character written.
    pub(crate) fn position(&self) -> usize {
        self.origin + self.written
    }

    /// Characters written to this sink.
    pub(crate) fn written(&self) -> usize {
        self.written
    }
}

/// Options of one `<expr; ...>` write, already rendered to text.
#[derive(Debug, Clone, Default)]
pub(crate) struct WriteOptions {
    pub(crate) separator: Option<String>,
    pub(crate) format: Option<String>,
    pub(crate) null: Option<String>,
}

impl Machine<'_> {
    /// Write `value` with `options`, returning the characters written.
    ///
    /// Null writes nothing unless the `null` option is set. Sequences and
    /// maps write each element, skipping nulls without a `null` option, with
    /// the separator only between elements that were written. Instances
    /// run in a child frame of `env`.
    pub(crate) fn write_value(
        &mut self,
        env: &Env<'_>,
        sink: &mut Sink<'_>,
        value: &Value,
        options: &WriteOptions,
    ) -> usize {
        match value {
            Value::Null => match &options.null {
                Some(text) => self.write_text(env, sink, text),
                None => 0,
            },
            Value::Scalar(scalar) => {
                let text = self.scalar_text(env, scalar, options.format.as_deref());
                self.write_text(env, sink, &text)
            }
            Value::Sequence(_) | Value::Map(_) => {
                let mut total = 0;
                let mut seen = false;
                for element in value.elements() {
                    if element.is_null() && options.null.is_none() {
                        continue;
                    }
                    if seen {
                        if let Some(separator) = &options.separator {
                            total += self.write_text(env, sink, separator);
                        }
                    }
                    total += self.write_value(env, sink, &element, options);
                    seen = true;
                }
                total
            }
            Value::Instance(instance) => match &options.format {
                Some(format) => {
                    let text = self.render_text(env, value);
                    let text = self.scalar_text(env, &Scalar::Str(text), Some(format));
                    self.write_text(env, sink, &text)
                }
                None => {
                    let start = sink.written();
                    self.invoke(instance, Some(env), sink);
                    sink.written() - start
                }
            },
        }
    }

    pub(crate) fn write_text(&self, env: &Env<'_>, sink: &mut Sink<'_>, text: &str) -> usize {
        if sink.failed || text.is_empty() {
            return 0;
        }
        match sink.out.write_str(text) {
            Ok(()) => {
                let count = text.chars().count();
                sink.written += count;
                self.cursor.set(sink.position());
                count
            }
            Err(e) => {
                sink.failed = true;
                self.report(env, Diagnostic::render(ErrorKind::OutputFailure).caused_by(e));
                0
            }
        }
    }

    /// Render `value` to a string with default options.
    ///
    /// Frames opened on the way record positions as if the text were
    /// written at the current output position.
    pub(crate) fn render_text(&mut self, env: &Env<'_>, value: &Value) -> String {
        if let Value::Scalar(Scalar::Str(text)) = value {
            return text.clone();
        }
        let origin = self.cursor.get();
        let mut buffer = String::new();
        let mut sink = Sink::starting_at(&mut buffer, origin);
        self.write_value(env, &mut sink, value, &WriteOptions::default());
        self.cursor.set(origin);
        buffer
    }

    /// Convert a scalar to text through the registered renderer for its
    /// kind, falling back to its `Display` form.
    fn scalar_text(&self, env: &Env<'_>, scalar: &Scalar, format: Option<&str>) -> String {
        let kind = scalar.kind();
        let Some(renderer) = self.group().renderer_for(&kind) else {
            return scalar.to_string();
        };
        match renderer.render(scalar, format) {
            Ok(text) => text,
            Err(cause) => {
                self.report(
                    env,
                    Diagnostic::render(ErrorKind::RendererFailure)
                        .arg(format!("{kind:?}"))
                        .caused_by_boxed(cause),
                );
                scalar.to_string()
            }
        }
    }
}
