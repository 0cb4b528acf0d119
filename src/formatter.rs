//! Canonical reformatter.
//!
//! Parses a working text into an explicit tree and re-serializes it with a
//! deterministic layout: one element per line, children indented one unit,
//! attributes in source order, empty elements self-closed, sole text content
//! inline. The serializer is purpose-built and never emits blank separator
//! lines, so no cleanup pass runs afterwards and blank lines inside inline
//! text content are never at risk.
//!
//! Formatting is a fixed point: feeding the output back through produces the
//! same bytes, which is what lets the change detector call a file canonical.

use std::str::from_utf8;

use quick_xml::Reader;
use quick_xml::escape::{escape, partial_escape};
use quick_xml::events::Event;

use crate::cdata::CdataVault;
use crate::config::FormatConfig;
use crate::error::{FormatError, Result};

/// One node of the parsed document tree.
#[derive(Debug, Clone)]
enum Node {
    Element(Element),
    /// Character data, entities resolved.
    Text(String),
    /// Literal section content, delimiters excluded, kept verbatim.
    CData(String),
    Comment(String),
    Pi(String),
}

#[derive(Debug, Clone)]
struct Element {
    name: String,
    /// Source order is significant and must never be changed.
    attributes: Vec<(String, String)>,
    children: Vec<Node>,
}

/// Comments, processing instructions and the doctype outside the document
/// element, kept in source order.
#[derive(Debug, Clone)]
enum Misc {
    Comment(String),
    Pi(String),
    DocType(String),
}

#[derive(Debug)]
struct Tree {
    prolog: Vec<Misc>,
    root: Element,
    epilog: Vec<Misc>,
}

/// Reformat `text` (which must not contain CDATA sections; see
/// [`canonicalize`]) into its canonical form, or return a parse failure
/// describing why the input is not well-formed.
pub fn format_document(text: &str, config: &FormatConfig) -> Result<String> {
    let tree = parse(text)?;
    serialize(&tree, config)
}

/// The full pure pipeline: extract literal sections, reformat, restore.
///
/// This is the entry point callers use when they want the canonical text
/// without touching storage, e.g. to snapshot the original bytes first.
pub fn canonicalize(text: &str, config: &FormatConfig) -> Result<String> {
    let (working, vault) = CdataVault::extract(text);
    let formatted = format_document(&working, config)?;
    Ok(vault.restore(&formatted))
}

fn parse(text: &str) -> Result<Tree> {
    let text = text.trim_start_matches('\u{feff}');
    let mut reader = Reader::from_str(text);
    let reader_config = reader.config_mut();
    reader_config.check_end_names = true;
    reader_config.allow_unmatched_ends = false;

    let mut prolog: Vec<Misc> = Vec::new();
    let mut epilog: Vec<Misc> = Vec::new();
    let mut root: Option<Element> = None;
    let mut stack: Vec<Element> = Vec::new();
    let mut pending_text = String::new();
    let mut seen_decl = false;

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(err) => return Err(FormatError::parse(position(&reader), err)),
        };

        match event {
            Event::Decl(_) => {
                if seen_decl || root.is_some() || !stack.is_empty() {
                    return Err(FormatError::parse(
                        position(&reader),
                        "unexpected XML declaration",
                    ));
                }
                // Replaced by the canonical declaration on output.
                seen_decl = true;
            }
            Event::DocType(doctype) => {
                if root.is_some() || !stack.is_empty() {
                    return Err(FormatError::parse(position(&reader), "unexpected doctype"));
                }
                let raw = decode_raw(&doctype.into_inner(), &reader)?.trim().to_string();
                prolog.push(Misc::DocType(raw));
            }
            Event::Start(start) => {
                if root.is_some() && stack.is_empty() {
                    return Err(FormatError::parse(
                        position(&reader),
                        "content after document element",
                    ));
                }
                flush_text(&mut stack, &mut pending_text);
                let name = decode_raw(start.name().into_inner(), &reader)?.to_string();
                let attributes = collect_attributes(&start, &reader)?;
                stack.push(Element {
                    name,
                    attributes,
                    children: Vec::new(),
                });
            }
            Event::Empty(start) => {
                if root.is_some() && stack.is_empty() {
                    return Err(FormatError::parse(
                        position(&reader),
                        "content after document element",
                    ));
                }
                flush_text(&mut stack, &mut pending_text);
                let name = decode_raw(start.name().into_inner(), &reader)?.to_string();
                let attributes = collect_attributes(&start, &reader)?;
                let element = Element {
                    name,
                    attributes,
                    children: Vec::new(),
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(Node::Element(element)),
                    None => root = Some(element),
                }
            }
            Event::End(_) => {
                // Name mismatches are already rejected by the reader.
                flush_text(&mut stack, &mut pending_text);
                let element = stack.pop().ok_or_else(|| {
                    FormatError::parse(position(&reader), "close tag without open tag")
                })?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(Node::Element(element)),
                    None => root = Some(element),
                }
            }
            Event::Text(text) => {
                let unescaped = text
                    .unescape()
                    .map_err(|err| FormatError::parse(position(&reader), err))?;
                if stack.is_empty() {
                    if !unescaped.trim().is_empty() {
                        return Err(FormatError::parse(
                            position(&reader),
                            "text outside document element",
                        ));
                    }
                } else {
                    pending_text.push_str(&unescaped);
                }
            }
            Event::CData(cdata) => {
                if stack.is_empty() {
                    return Err(FormatError::parse(
                        position(&reader),
                        "CDATA outside document element",
                    ));
                }
                flush_text(&mut stack, &mut pending_text);
                let raw = decode_raw(&cdata.into_inner(), &reader)?.to_string();
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::CData(raw));
                }
            }
            Event::Comment(comment) => {
                let raw = decode_raw(&comment.into_inner(), &reader)?.to_string();
                match stack.last_mut() {
                    Some(parent) => {
                        flush_text_into(parent, &mut pending_text);
                        parent.children.push(Node::Comment(raw));
                    }
                    None if root.is_none() => prolog.push(Misc::Comment(raw)),
                    None => epilog.push(Misc::Comment(raw)),
                }
            }
            Event::PI(pi) => {
                let raw = decode_raw(&pi.into_inner(), &reader)?.to_string();
                match stack.last_mut() {
                    Some(parent) => {
                        flush_text_into(parent, &mut pending_text);
                        parent.children.push(Node::Pi(raw));
                    }
                    None if root.is_none() => prolog.push(Misc::Pi(raw)),
                    None => epilog.push(Misc::Pi(raw)),
                }
            }
            Event::Eof => {
                if let Some(open) = stack.last() {
                    return Err(FormatError::parse(
                        position(&reader),
                        format!("unclosed element `{}`", open.name),
                    ));
                }
                let root = root.ok_or_else(|| {
                    FormatError::parse(position(&reader), "no document element")
                })?;
                return Ok(Tree {
                    prolog,
                    root,
                    epilog,
                });
            }
        }
    }
}

fn position<R>(reader: &Reader<R>) -> u64 {
    reader.buffer_position() as u64
}

fn decode_raw<'a, R>(bytes: &'a [u8], reader: &Reader<R>) -> Result<&'a str> {
    from_utf8(bytes).map_err(|err| FormatError::parse(position(reader), err))
}

fn collect_attributes<R>(
    start: &quick_xml::events::BytesStart<'_>,
    reader: &Reader<R>,
) -> Result<Vec<(String, String)>> {
    let mut attributes = Vec::new();
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|err| FormatError::parse(position(reader), err))?;
        let key = decode_raw(attribute.key.into_inner(), reader)?.to_string();
        let value = attribute
            .unescape_value()
            .map_err(|err| FormatError::parse(position(reader), err))?
            .into_owned();
        attributes.push((key, value));
    }
    Ok(attributes)
}

/// Attach accumulated character data to the innermost open element.
/// Whitespace-only runs between elements are layout, not content, and are
/// dropped here; that is what keeps the serializer free of blank lines.
fn flush_text(stack: &mut Vec<Element>, pending: &mut String) {
    if let Some(top) = stack.last_mut() {
        flush_text_into(top, pending);
    } else {
        pending.clear();
    }
}

fn flush_text_into(element: &mut Element, pending: &mut String) {
    if pending.is_empty() {
        return;
    }
    if pending.trim().is_empty() {
        pending.clear();
        return;
    }
    element.children.push(Node::Text(std::mem::take(pending)));
}

fn serialize(tree: &Tree, config: &FormatConfig) -> Result<String> {
    let encoding = config.encoding()?;

    let mut out = String::new();
    out.push_str(&format!(
        "<?xml version=\"1.0\" encoding=\"{}\"?>\n",
        encoding.name()
    ));
    for misc in &tree.prolog {
        write_misc(&mut out, misc);
    }
    write_element(&mut out, &tree.root, 0, config);
    for misc in &tree.epilog {
        write_misc(&mut out, misc);
    }
    Ok(out)
}

fn write_misc(out: &mut String, misc: &Misc) {
    match misc {
        Misc::Comment(comment) => out.push_str(&format!("<!--{comment}-->\n")),
        Misc::Pi(pi) => out.push_str(&format!("<?{pi}?>\n")),
        Misc::DocType(doctype) => out.push_str(&format!("<!DOCTYPE {doctype}>\n")),
    }
}

fn write_element(out: &mut String, element: &Element, depth: usize, config: &FormatConfig) {
    let indent = config.indent.repeat(depth);
    let open = open_tag(element);

    match element.children.as_slice() {
        [] => {
            out.push_str(&format!("{indent}<{open}/>\n"));
        }
        // Sole text or literal content stays inline with its element, as is.
        [Node::Text(text)] => {
            out.push_str(&format!(
                "{indent}<{open}>{}</{}>\n",
                partial_escape(text.as_str()),
                element.name
            ));
        }
        [Node::CData(cdata)] => {
            out.push_str(&format!(
                "{indent}<{open}><![CDATA[{cdata}]]></{}>\n",
                element.name
            ));
        }
        children => {
            out.push_str(&format!("{indent}<{open}>\n"));
            let child_indent = config.indent.repeat(depth + 1);
            for child in children {
                match child {
                    Node::Element(child_element) => {
                        write_element(out, child_element, depth + 1, config);
                    }
                    // Trimmed, so that the indentation this pass adds is not
                    // mistaken for content by the next pass.
                    Node::Text(text) => {
                        out.push_str(&format!(
                            "{child_indent}{}\n",
                            partial_escape(text.trim())
                        ));
                    }
                    Node::CData(cdata) => {
                        out.push_str(&format!("{child_indent}<![CDATA[{cdata}]]>\n"));
                    }
                    Node::Comment(comment) => {
                        out.push_str(&format!("{child_indent}<!--{comment}-->\n"));
                    }
                    Node::Pi(pi) => {
                        out.push_str(&format!("{child_indent}<?{pi}?>\n"));
                    }
                }
            }
            out.push_str(&format!("{indent}</{}>\n", element.name));
        }
    }
}

fn open_tag(element: &Element) -> String {
    let mut tag = element.name.clone();
    for (key, value) in &element.attributes {
        tag.push_str(&format!(" {key}=\"{}\"", escape(value.as_str())));
    }
    tag
}
