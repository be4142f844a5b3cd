//! Response serialization: the dandanplay-style JSON envelope and the
//! Bilibili-compatible XML document.

use std::io::Cursor;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use rand::Rng;
use serde_json::{json, Value};

use crate::models::Danmaku;
use crate::{Error, Result};

/// Fixed legacy send-timestamp kept for bit-compatible XML output.
const LEGACY_TIMESTAMP: u64 = 1_751_533_608;

/// `{count, comments: [{cid, p, m}]}` with 1-based sequence ids.
pub fn to_json(comments: &[Danmaku]) -> Value {
    let items: Vec<Value> = comments
        .iter()
        .enumerate()
        .map(|(i, d)| {
            json!({
                "cid": i + 1,
                "p": d.p_field(),
                "m": d.text,
            })
        })
        .collect();
    json!({
        "count": items.len(),
        "comments": items,
    })
}

/// Bilibili `<i>` document with the 8-field `p` attribute
/// (`t,mode,size,color,ts,pool,userHash,id`).
pub fn to_xml(comments: &[Danmaku], font_size: u32) -> Result<String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let mut rng = rand::thread_rng();

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(xml_err)?;
    writer
        .write_event(Event::Start(BytesStart::new("i")))
        .map_err(xml_err)?;

    write_text_element(&mut writer, "chatserver", "chat.bilibili.com")?;
    write_text_element(&mut writer, "chatid", "0")?;
    write_text_element(&mut writer, "mission", "0")?;
    write_text_element(&mut writer, "maxlimit", &comments.len().to_string())?;
    write_text_element(&mut writer, "state", "0")?;
    write_text_element(&mut writer, "real_name", "0")?;

    for comment in comments {
        let did: u64 = rng.gen_range(10_000_000_000..100_000_000_000);
        let p = format!(
            "{:.2},{},{},{},{},0,0,{}",
            comment.time,
            comment.mode.as_int(),
            font_size,
            comment.color,
            LEGACY_TIMESTAMP,
            did
        );
        let mut el = BytesStart::new("d");
        el.push_attribute(("p", p.as_str()));
        writer.write_event(Event::Start(el)).map_err(xml_err)?;
        writer
            .write_event(Event::Text(BytesText::new(&comment.text)))
            .map_err(xml_err)?;
        writer
            .write_event(Event::End(BytesEnd::new("d")))
            .map_err(xml_err)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("i")))
        .map_err(xml_err)?;

    String::from_utf8(writer.into_inner().into_inner())
        .map_err(|e| Error::Internal(format!("xml output not utf-8: {e}")))
}

fn write_text_element(writer: &mut Writer<Cursor<Vec<u8>>>, name: &str, value: &str) -> Result<()> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(xml_err)?;
    writer
        .write_event(Event::Text(BytesText::new(value)))
        .map_err(xml_err)?;
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(xml_err)?;
    Ok(())
}

fn xml_err<E: std::fmt::Display>(e: E) -> Error {
    Error::Internal(format!("xml serialization failed: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DanmakuMode, WHITE};

    fn sample() -> Vec<Danmaku> {
        vec![
            Danmaku::new(1.0, DanmakuMode::Scroll, WHITE, "first").with_platform("tencent"),
            Danmaku::new(2.5, DanmakuMode::Top, 255, "two <&> three").with_platform("bilibili"),
        ]
    }

    #[test]
    fn test_json_envelope() {
        let value = to_json(&sample());
        assert_eq!(value["count"], 2);
        assert_eq!(value["comments"][0]["cid"], 1);
        assert_eq!(value["comments"][1]["cid"], 2);
        assert_eq!(value["comments"][0]["p"], "1.00,1,16777215,[tencent]");
        assert_eq!(value["comments"][1]["m"], "two <&> three");
    }

    #[test]
    fn test_xml_document() {
        let xml = to_xml(&sample(), 25).unwrap();
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("<i>"));
        assert!(xml.contains(&format!("1.00,1,25,16777215,{LEGACY_TIMESTAMP},0,0,")));
        assert!(xml.contains(&format!("2.50,5,25,255,{LEGACY_TIMESTAMP},0,0,")));
        // Special characters are escaped.
        assert!(xml.contains("two &lt;&amp;&gt; three"));
    }

    #[test]
    fn test_xml_roundtrips_through_parser() {
        let xml = to_xml(&sample(), 25).unwrap();
        let parsed = super::super::parse::parse_bili_xml(&xml, "test").unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].time, 1.0);
        assert_eq!(parsed[1].color, 255);
    }
}
