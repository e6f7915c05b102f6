//! DASH manifest rewriting.
//!
//! Segment locations in the manifests we receive are relative to a CDN. Every
//! `BaseURL` element gets the configured base prefixed so the transcoder can fetch
//! segments directly.

use quick_xml::events::{BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;

use crate::error::{DownloadError, Error, Result};

const BASE_URL: &[u8] = b"BaseURL";
const MPD: &[u8] = b"MPD";

fn malformed(reason: String) -> Error {
    Error::Download(DownloadError::MalformedPlaylist(reason))
}

fn write(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| malformed(format!("failed to write manifest: {}", e)))
}

/// Prefix the text of every `BaseURL` element with `prefix`
///
/// Returns the rewritten manifest and the number of elements changed. Everything
/// else in the document is passed through unchanged. Fails when the input is not
/// well-formed XML or has no `MPD` element.
pub fn rewrite_base_urls(manifest: &[u8], prefix: &str) -> Result<(Vec<u8>, usize)> {
    let mut reader = Reader::from_reader(manifest);
    let mut writer = Writer::new(Vec::with_capacity(manifest.len() + 256));
    let mut buf = Vec::new();

    let mut saw_mpd = false;
    let mut in_base_url = false;
    let mut prefixed = false;
    let mut rewritten = 0usize;

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| {
            malformed(format!(
                "invalid manifest at byte {}: {}",
                reader.buffer_position(),
                e
            ))
        })?;

        match event {
            Event::Eof => break,
            Event::Start(ref start) => {
                let name = start.local_name();
                if name.as_ref() == MPD {
                    saw_mpd = true;
                }
                if name.as_ref() == BASE_URL {
                    in_base_url = true;
                    prefixed = false;
                }
                write(&mut writer, event)?;
            }
            Event::Empty(ref start) if start.local_name().as_ref() == BASE_URL => {
                write(&mut writer, Event::Start(start.clone()))?;
                write(&mut writer, Event::Text(BytesText::new(prefix)))?;
                write(&mut writer, Event::End(start.to_end()))?;
                rewritten += 1;
            }
            Event::Empty(ref start) => {
                if start.local_name().as_ref() == MPD {
                    saw_mpd = true;
                }
                write(&mut writer, event)?;
            }
            Event::Text(ref text) if in_base_url && !prefixed => {
                let value = text
                    .unescape()
                    .map_err(|e| malformed(format!("invalid BaseURL text: {}", e)))?;
                let value = format!("{}{}", prefix, value.trim());
                write(&mut writer, Event::Text(BytesText::new(&value)))?;
                prefixed = true;
                rewritten += 1;
            }
            Event::CData(ref data) if in_base_url && !prefixed => {
                let value = String::from_utf8_lossy(data);
                let value = format!("{}{}", prefix, value.trim());
                write(&mut writer, Event::Text(BytesText::new(&value)))?;
                prefixed = true;
                rewritten += 1;
            }
            Event::End(ref end) if end.local_name().as_ref() == BASE_URL => {
                if in_base_url && !prefixed {
                    write(&mut writer, Event::Text(BytesText::new(prefix)))?;
                    rewritten += 1;
                }
                in_base_url = false;
                write(&mut writer, event)?;
            }
            _ => write(&mut writer, event)?,
        }
        buf.clear();
    }

    if !saw_mpd {
        return Err(malformed("manifest has no MPD element".to_string()));
    }

    Ok((writer.into_inner(), rewritten))
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    const CDN: &str = "https://cdn.example/d/";

    const MANIFEST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<MPD xmlns="urn:mpeg:dash:schema:mpd:2011" type="static">
  <Period>
    <AdaptationSet mimeType="video/mp4">
      <Representation id="v0" bandwidth="800000">
        <BaseURL>video/seg_v0.mp4</BaseURL>
      </Representation>
    </AdaptationSet>
    <AdaptationSet mimeType="audio/mp4">
      <Representation id="a0" bandwidth="64000">
        <BaseURL>audio/seg_a0.mp4?token=a&amp;b=1</BaseURL>
      </Representation>
    </AdaptationSet>
  </Period>
</MPD>"#;

    fn rewrite(input: &str) -> (String, usize) {
        let (out, count) = rewrite_base_urls(input.as_bytes(), CDN).unwrap();
        (String::from_utf8(out).unwrap(), count)
    }

    #[test]
    fn test_prefixes_every_base_url() {
        let (out, count) = rewrite(MANIFEST);
        assert_eq!(count, 2);
        assert!(out.contains("<BaseURL>https://cdn.example/d/video/seg_v0.mp4</BaseURL>"));
        // Entities survive the round trip
        assert!(
            out.contains("<BaseURL>https://cdn.example/d/audio/seg_a0.mp4?token=a&amp;b=1</BaseURL>")
        );
    }

    #[test]
    fn test_preserves_rest_of_document() {
        let (out, _) = rewrite(MANIFEST);
        assert!(out.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(out.contains(r#"<Representation id="v0" bandwidth="800000">"#));
        assert!(out.contains(r#"type="static""#));
        assert_eq!(
            out.matches("<AdaptationSet").count(),
            MANIFEST.matches("<AdaptationSet").count()
        );
    }

    #[test]
    fn test_empty_and_namespaced_base_urls() {
        let input = r#"<dash:MPD xmlns:dash="urn:mpeg:dash:schema:mpd:2011"><dash:BaseURL/><dash:BaseURL>  seg.mp4 </dash:BaseURL></dash:MPD>"#;
        let (out, count) = rewrite(input);
        assert_eq!(count, 2);
        assert!(out.contains("<dash:BaseURL>https://cdn.example/d/</dash:BaseURL>"));
        assert!(out.contains("<dash:BaseURL>https://cdn.example/d/seg.mp4</dash:BaseURL>"));
    }

    #[test]
    fn test_manifest_without_base_urls_is_unchanged() {
        let input = "<MPD><Period/></MPD>";
        let (out, count) = rewrite(input);
        assert_eq!(count, 0);
        assert_eq!(out, input);
    }

    #[test]
    fn test_accepts_manifest_after_comments() {
        let (out, count) =
            rewrite("<!-- generated by packager --><MPD><BaseURL>seg.mp4</BaseURL></MPD>");
        assert_eq!(count, 1);
        assert!(out.starts_with("<!-- generated by packager -->"));
        assert!(out.contains("<BaseURL>https://cdn.example/d/seg.mp4</BaseURL>"));

        let input = format!(
            "<?xml version=\"1.0\"?>\n<!-- {} -->\n<MPD><BaseURL>a.mp4</BaseURL></MPD>",
            "banner ".repeat(50)
        );
        let (out, count) = rewrite(&input);
        assert_eq!(count, 1);
        assert!(out.contains("<BaseURL>https://cdn.example/d/a.mp4</BaseURL>"));
    }

    #[test]
    fn test_rejects_non_manifest_documents() {
        let err = rewrite_base_urls(b"<rss><channel/></rss>", CDN).unwrap_err();
        assert!(matches!(
            err,
            Error::Download(DownloadError::MalformedPlaylist(_))
        ));

        let err = rewrite_base_urls(b"<MPD><BaseURL>x</Period></MPD>", CDN).unwrap_err();
        assert!(matches!(
            err,
            Error::Download(DownloadError::MalformedPlaylist(_))
        ));
    }
}
