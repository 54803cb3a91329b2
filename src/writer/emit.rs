//! Thin event layer over the quick-xml writer

use crate::error::{Error, Result};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::io::Write;

/// Indented XML output mapping every failure to [`Error::XmlWrite`]
pub(crate) struct XmlSink<W: Write> {
    inner: Writer<W>,
}

impl<W: Write> XmlSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            inner: Writer::new_with_indent(out, b' ', 2),
        }
    }

    fn event(&mut self, event: Event<'_>, what: &str) -> Result<()> {
        self.inner
            .write_event(event)
            .map_err(|e| Error::xml_write(format!("failed to write {}: {}", what, e)))
    }

    pub fn decl(&mut self) -> Result<()> {
        self.event(
            Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)),
            "XML declaration",
        )
    }

    pub fn start(&mut self, elem: BytesStart<'_>) -> Result<()> {
        let what = format!("<{}>", String::from_utf8_lossy(elem.name().as_ref()));
        self.event(Event::Start(elem), &what)
    }

    pub fn empty(&mut self, elem: BytesStart<'_>) -> Result<()> {
        let what = format!("<{}/>", String::from_utf8_lossy(elem.name().as_ref()));
        self.event(Event::Empty(elem), &what)
    }

    pub fn end(&mut self, name: &str) -> Result<()> {
        self.event(Event::End(BytesEnd::new(name)), name)
    }

    /// `<name attrs>text</name>`
    pub fn text_element(&mut self, elem: BytesStart<'_>, text: &str) -> Result<()> {
        let name = String::from_utf8_lossy(elem.name().as_ref()).into_owned();
        self.start(elem)?;
        self.event(Event::Text(BytesText::new(text)), &name)?;
        self.end(&name)
    }

    pub fn into_inner(self) -> W {
        self.inner.into_inner()
    }
}

/// Fixed-point rendering with trailing zeros trimmed; negative zero prints as `0`
pub(crate) fn format_number(value: f64, precision: usize) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let mut out = format!("{:.*}", precision, value);
    if out.contains('.') {
        let len = out.trim_end_matches('0').trim_end_matches('.').len();
        out.truncate(len);
    }
    if out == "-0" {
        out.remove(0);
    }
    out
}
