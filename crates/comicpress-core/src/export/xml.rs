//! XML output shared by the archive and EPUB renderers

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::error::RenderError;

pub type XmlWriter = Writer<Vec<u8>>;

/// Start an indented UTF-8 document
pub fn xml_document() -> Result<XmlWriter, RenderError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    Ok(writer)
}

/// Write an element with attributes and text content
pub fn write_element(
    writer: &mut XmlWriter,
    start: BytesStart<'_>,
    text: &str,
) -> Result<(), RenderError> {
    let end = start.to_end().into_owned();
    writer.write_event(Event::Start(start))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(end))?;
    Ok(())
}

/// Write `<name>text</name>`
pub fn write_text_element(
    writer: &mut XmlWriter,
    name: &str,
    text: &str,
) -> Result<(), RenderError> {
    write_element(writer, BytesStart::new(name), text)
}

pub fn open(writer: &mut XmlWriter, start: BytesStart<'_>) -> Result<(), RenderError> {
    writer.write_event(Event::Start(start))?;
    Ok(())
}

pub fn close(writer: &mut XmlWriter, name: &str) -> Result<(), RenderError> {
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

pub fn empty(writer: &mut XmlWriter, element: BytesStart<'_>) -> Result<(), RenderError> {
    writer.write_event(Event::Empty(element))?;
    Ok(())
}

/// Element with attributes, for use with [`open`], [`empty`] or [`write_element`]
pub fn element<'a>(name: &'a str, attributes: &[(&'a str, &'a str)]) -> BytesStart<'a> {
    let mut start = BytesStart::new(name);
    for &attribute in attributes {
        start.push_attribute(attribute);
    }
    start
}

/// Finished document bytes, newline terminated
pub fn finish(writer: XmlWriter) -> Vec<u8> {
    let mut bytes = writer.into_inner();
    bytes.push(b'\n');
    bytes
}
