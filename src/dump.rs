//! Streaming page extraction from MediaWiki XML dumps.

use crate::error::Result;
use bzip2::read::BzDecoder;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

lazy_static! {
    pub static ref TITLE_PATTERN: Regex = Regex::new(r"<title>([^<]+)</title>").unwrap();
    pub static ref NS_PATTERN: Regex = Regex::new(r"<ns>(-?\d+)</ns>").unwrap();
    pub static ref TEXT_PATTERN: Regex = Regex::new(r"(?s)<text[^>]*>(.+?)</text>").unwrap();
    pub static ref REDIRECT_PATTERN: Regex = Regex::new(r#"<redirect\s+title="[^"]+""#).unwrap();
    static ref XML_ENTITY: Regex = Regex::new(r"&(lt|gt|amp|quot|apos|#\d+|#x[0-9a-fA-F]+);").unwrap();
}

const READ_CHUNK: usize = 1024 * 1024;
const READ_BUFFER: usize = 256 * 1024;

/// One `<page>` element, entities decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPage {
    pub title: String,
    pub namespace: i64,
    pub text: String,
    pub page_id: usize,
    pub is_redirect: bool,
}

/// Open a dump, decompressing `.bz2` on the fly.
pub fn open_dump(path: &Path) -> Result<Box<dyn BufRead + Send>> {
    let file = File::open(path)?;
    let reader: Box<dyn BufRead + Send> = if path.to_string_lossy().ends_with(".bz2") {
        Box::new(BufReader::with_capacity(READ_BUFFER, BzDecoder::new(file)))
    } else {
        Box::new(BufReader::with_capacity(READ_BUFFER, file))
    };
    Ok(reader)
}

/// Feed each complete `<page>...</page>` to `callback` until it returns false.
pub fn scan_pages(mut reader: impl BufRead, mut callback: impl FnMut(String) -> bool) -> std::io::Result<()> {
    let mut buffer = String::new();
    let mut chunk = vec![0u8; READ_CHUNK];
    // Bytes of a character split across two reads
    let mut carry: Vec<u8> = Vec::new();

    loop {
        let bytes_read = reader.read(&mut chunk)?;
        if bytes_read == 0 {
            break;
        }

        carry.extend_from_slice(&chunk[..bytes_read]);
        let valid = match std::str::from_utf8(&carry) {
            Ok(_) => carry.len(),
            Err(err) if err.error_len().is_none() => err.valid_up_to(),
            Err(_) => carry.len(),
        };
        buffer.push_str(&String::from_utf8_lossy(&carry[..valid]));
        carry.drain(..valid);

        while let Some(start) = buffer.find("<page>") {
            if let Some(end_offset) = buffer[start..].find("</page>") {
                let end = start + end_offset + "</page>".len();
                let page_xml = buffer[start..end].to_string();
                buffer.drain(..end);

                if !callback(page_xml) {
                    return Ok(());
                }
            } else {
                buffer.drain(..start);
                break;
            }
        }

        if buffer.len() > 10 && !buffer.contains("<page>") {
            let mut keep_from = buffer.len() - 10;
            while !buffer.is_char_boundary(keep_from) {
                keep_from -= 1;
            }
            buffer.drain(..keep_from);
        }
    }

    Ok(())
}

/// Pull title, namespace and text out of one page element.
///
/// Returns `None` when the page has no title. A page without `<ns>` is
/// treated as main namespace, one without text gets empty text.
pub fn extract_page(page_xml: &str, page_id: usize) -> Option<RawPage> {
    let title = TITLE_PATTERN.captures(page_xml).map(|cap| unescape_xml(&cap[1]).into_owned())?;
    let namespace = NS_PATTERN
        .captures(page_xml)
        .and_then(|cap| cap[1].parse().ok())
        .unwrap_or(0);
    let text = TEXT_PATTERN
        .captures(page_xml)
        .map(|cap| unescape_xml(&cap[1]).into_owned())
        .unwrap_or_default();

    Some(RawPage {
        title,
        namespace,
        text,
        page_id,
        is_redirect: REDIRECT_PATTERN.is_match(page_xml),
    })
}

/// Talk namespaces are the odd ones.
pub fn is_talk_namespace(namespace: i64) -> bool {
    namespace > 0 && namespace % 2 == 1
}

pub fn unescape_xml(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }
    XML_ENTITY.replace_all(text, |caps: &Captures| {
        let entity = &caps[1];
        let decoded = match entity {
            "lt" => Some('<'),
            "gt" => Some('>'),
            "amp" => Some('&'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => {
                let code = match entity.strip_prefix("#x") {
                    Some(hex) => u32::from_str_radix(hex, 16).ok(),
                    None => entity[1..].parse().ok(),
                };
                code.and_then(char::from_u32)
            }
        };
        decoded.map_or_else(|| caps[0].to_string(), String::from)
    })
}
