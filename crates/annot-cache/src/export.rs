//! Text export of a dense cache: delimited rows and the XML session form.

use std::io::Write;

use crate::dense::CompressedDenseCache;
use crate::error::CacheError;

impl CompressedDenseCache {
    /// Column headers for delimited export: `Bin1` to `BinN`.
    pub fn string_export_headers(&self) -> Vec<String> {
        (1..=self.height()).map(|n| format!("Bin{n}")).collect()
    }

    /// One row of formatted values per column whose first frame lies in
    /// `[start_frame, start_frame + duration)`.
    pub fn string_export_rows(&self, start_frame: i64, duration: i64) -> Vec<Vec<String>> {
        let state = self.read();
        let resolution = i64::from(state.resolution);
        let end_frame = start_frame.saturating_add(duration);

        (0..state.store.width())
            .filter(|&i| {
                let frame = state.start_frame + i as i64 * resolution;
                frame >= start_frame && frame < end_frame
            })
            .map(|i| state.column(i).iter().map(f32::to_string).collect())
            .collect()
    }

    /// Writes the cache as a `<model>` element followed by its `<dataset>`.
    ///
    /// `extra_attributes` is appended verbatim to the model element.
    pub fn to_xml<W: Write>(&self, out: &mut W, indent: &str, extra_attributes: &str) -> Result<(), CacheError> {
        let state = self.read();
        let id = self.id();

        write!(
            out,
            "{indent}<model id=\"{id}\" sampleRate=\"{}\" start=\"{}\" end=\"{}\" type=\"dense\" dimensions=\"3\" \
             windowSize=\"{}\" yBinCount=\"{}\" minimum=\"{}\" maximum=\"{}\" dataset=\"{id}\" startFrame=\"{}\"",
            state.sample_rate,
            state.start_frame,
            state.start_frame + state.true_end_frame(),
            state.resolution,
            state.store.height(),
            state.minimum,
            state.maximum,
            state.start_frame,
        )?;
        if !extra_attributes.is_empty() {
            write!(out, " {extra_attributes}")?;
        }
        writeln!(out, "/>")?;

        writeln!(out, "{indent}<dataset id=\"{id}\" dimensions=\"3\" separator=\" \">")?;

        for (n, name) in state.bin_names.iter().enumerate() {
            if !name.is_empty() {
                writeln!(out, "{indent}  <bin number=\"{n}\" name=\"{}\"/>", escape(name))?;
            }
        }

        for i in 0..state.store.width() {
            let row: Vec<String> = state.column(i).iter().map(f32::to_string).collect();
            writeln!(out, "{indent}  <row n=\"{i}\">{}</row>", row.join(" "))?;
        }

        writeln!(out, "{indent}</dataset>")?;
        out.flush()?;
        Ok(())
    }
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CompressedDenseCache {
        let cache = CompressedDenseCache::new(8000.0, 100, 3, true);
        cache.set_start_frame(1000);
        cache.set_column(0, &[0.5, 1.0, 1.5]);
        cache.set_column(1, &[0.5, 1.0, 2.0]);
        cache.set_column(2, &[-1.0, 1.0, 2.0]);
        cache
    }

    #[test]
    fn test_headers() {
        assert_eq!(sample().string_export_headers(), vec!["Bin1", "Bin2", "Bin3"]);
    }

    #[test]
    fn test_rows_filtered_by_frame_range() {
        let cache = sample();
        let rows = cache.string_export_rows(1100, 200);
        assert_eq!(
            rows,
            vec![
                vec!["0.5".to_string(), "1".to_string(), "2".to_string()],
                vec!["-1".to_string(), "1".to_string(), "2".to_string()],
            ]
        );
        assert_eq!(cache.string_export_rows(0, 1000).len(), 0);
        assert_eq!(cache.string_export_rows(0, i64::MAX).len(), 3);
    }

    #[test]
    fn test_xml_form() {
        let cache = sample();
        cache.set_bin_name(1, "Mid & <high>");

        let mut out = Vec::new();
        cache.to_xml(&mut out, "  ", "name=\"Chroma\"").expect("xml");
        let xml = String::from_utf8(out).expect("utf8");
        let lines: Vec<&str> = xml.lines().collect();

        assert!(lines[0].starts_with("  <model id=\""));
        assert!(lines[0].contains("type=\"dense\" dimensions=\"3\" windowSize=\"100\" yBinCount=\"3\""));
        assert!(lines[0].contains("minimum=\"-1\" maximum=\"2\""));
        assert!(lines[0].contains("startFrame=\"1000\""));
        assert!(lines[0].ends_with("name=\"Chroma\"/>"));
        assert!(lines[1].starts_with("  <dataset id=\""));
        assert_eq!(lines[2], "    <bin number=\"1\" name=\"Mid &amp; &lt;high&gt;\"/>");
        assert_eq!(lines[3], "    <row n=\"0\">0.5 1 1.5</row>");
        assert_eq!(lines[5], "    <row n=\"2\">-1 1 2</row>");
        assert_eq!(lines[6], "  </dataset>");
        assert_eq!(lines.len(), 7);
    }
}
