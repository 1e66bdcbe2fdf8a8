//! Progress events and their human-readable rendering.
//!
//! The acquisition pipeline emits `ProgressEvent` values over a channel;
//! rendering is a pure function so a malformed event can degrade a single
//! field to an "(unknown ...)" placeholder but never fail the report.

/// A discrete pipeline progress update.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// Transfer in progress. All numeric fields are optional because the
    /// engine may omit or misreport any of them.
    Downloading {
        status: Option<String>,
        downloaded_bytes: Option<f64>,
        total_bytes: Option<f64>,
        elapsed: Option<f64>,
        eta: Option<f64>,
        speed: Option<f64>,
    },

    /// Codec conversion in progress.
    Converting { status: Option<String> },

    /// Download and conversion finished, tagging about to start.
    PostProcessing,

    /// The finished artifact is being delivered.
    Uploading,
}

/// Render a byte count as megabytes with two decimals.
///
/// `1500000` becomes `"1.50MB"`; anything absent or non-finite becomes
/// `"(unknown size)"`.
pub fn humanify_size(size: Option<f64>) -> String {
    match size {
        Some(s) if s.is_finite() => format!("{:.2}MB", s / 1_000_000.0),
        _ => "(unknown size)".to_string(),
    }
}

/// Render a duration in seconds as `"Xm Ys"`, omitting the minutes
/// component when zero. Absent or non-finite input becomes
/// `"(unknown time)"`.
pub fn humanify_time(time: Option<f64>) -> String {
    let Some(t) = time.filter(|t| t.is_finite()) else {
        return "(unknown time)".to_string();
    };

    let t = t as i64;
    let mut parts = Vec::new();
    if t / 60 > 0 {
        parts.push(format!("{}m", t / 60));
    }
    parts.push(format!("{}s", t % 60));
    parts.join(" ")
}

/// Render a progress event as an HTML status string. Never panics.
pub fn render(event: &ProgressEvent) -> String {
    match event {
        ProgressEvent::Downloading {
            status,
            downloaded_bytes,
            total_bytes,
            elapsed,
            eta,
            speed,
        } => format!(
            "<i>Downloading...</i>\n\n\
             <b>Status:</b> {}\n\
             <b>Downloaded:</b> {}\n\
             <b>Total size:</b> {}\n\
             <b>Elapsed time:</b> {}\n\
             <b>Estimated time:</b> {}\n\
             <b>Download speed:</b> {}/s\n",
            capitalize(status.as_deref().unwrap_or("unknown")),
            humanify_size(*downloaded_bytes),
            humanify_size(*total_bytes),
            humanify_time(*elapsed),
            humanify_time(*eta),
            humanify_size(*speed),
        ),

        ProgressEvent::Converting { status } => format!(
            "<i>Converting...</i>\n\n<b>Status:</b> {}\n",
            capitalize(status.as_deref().unwrap_or("unknown")),
        ),

        ProgressEvent::PostProcessing => "<i>Post-processing the file...</i>".to_string(),

        ProgressEvent::Uploading => "<i>Uploading the file...</i>".to_string(),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_formatting() {
        assert_eq!(humanify_size(Some(1_500_000.0)), "1.50MB");
        assert_eq!(humanify_size(Some(0.0)), "0.00MB");
        assert_eq!(humanify_size(None), "(unknown size)");
        assert_eq!(humanify_size(Some(f64::NAN)), "(unknown size)");
        assert_eq!(humanify_size(Some(f64::INFINITY)), "(unknown size)");
    }

    #[test]
    fn test_time_formatting() {
        assert_eq!(humanify_time(Some(125.0)), "2m 5s");
        assert_eq!(humanify_time(Some(45.0)), "45s");
        assert_eq!(humanify_time(Some(60.0)), "1m 0s");
        assert_eq!(humanify_time(Some(0.0)), "0s");
        assert_eq!(humanify_time(None), "(unknown time)");
        assert_eq!(humanify_time(Some(f64::NAN)), "(unknown time)");
    }

    #[test]
    fn test_render_downloading_full() {
        let text = render(&ProgressEvent::Downloading {
            status: Some("downloading".to_string()),
            downloaded_bytes: Some(1_500_000.0),
            total_bytes: Some(3_000_000.0),
            elapsed: Some(45.0),
            eta: Some(125.0),
            speed: Some(500_000.0),
        });

        assert!(text.contains("<b>Status:</b> Downloading"));
        assert!(text.contains("<b>Downloaded:</b> 1.50MB"));
        assert!(text.contains("<b>Total size:</b> 3.00MB"));
        assert!(text.contains("<b>Elapsed time:</b> 45s"));
        assert!(text.contains("<b>Estimated time:</b> 2m 5s"));
        assert!(text.contains("<b>Download speed:</b> 0.50MB/s"));
    }

    #[test]
    fn test_render_downloading_degrades_per_field() {
        let text = render(&ProgressEvent::Downloading {
            status: None,
            downloaded_bytes: None,
            total_bytes: None,
            elapsed: None,
            eta: None,
            speed: None,
        });

        assert!(!text.is_empty());
        assert!(text.contains("<b>Status:</b> Unknown"));
        assert!(text.contains("(unknown size)"));
        assert!(text.contains("(unknown time)"));
    }

    #[test]
    fn test_render_converting_only_status() {
        let text = render(&ProgressEvent::Converting {
            status: Some("started".to_string()),
        });

        assert_eq!(text, "<i>Converting...</i>\n\n<b>Status:</b> Started\n");
    }

    #[test]
    fn test_render_terminal_phases() {
        assert_eq!(
            render(&ProgressEvent::PostProcessing),
            "<i>Post-processing the file...</i>"
        );
        assert_eq!(
            render(&ProgressEvent::Uploading),
            "<i>Uploading the file...</i>"
        );
    }
}
