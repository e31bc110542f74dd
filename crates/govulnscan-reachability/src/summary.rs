//! One-line call-stack summaries
//!
//! A symbol-level trace is summarized by two boundary frames: the lowest
//! frame still in the scan target's own package ("top") and the highest
//! frame already in the vulnerable package. Anonymous functions never read
//! well in a one-liner, so each anonymous boundary frame is replaced by its
//! creator, the declared function it was defined in.

use govulnscan_core::Frame;

/// Summarize a finding trace (sink first, as emitted). Returns `None` when
/// the trace is not a call stack or the boundary frames cannot be located.
pub fn summarize(trace: &[Frame]) -> Option<String> {
    if trace.len() < 2 || trace.iter().any(|f| f.function.is_none()) {
        return None;
    }

    // Work entry -> sink.
    let frames: Vec<&Frame> = trace.iter().rev().collect();
    let top_pkg = frames.first()?.package.as_deref()?;
    let vuln_pkg = frames.last()?.package.as_deref()?;

    // Lowest (nearest-sink) frame still in the top package.
    let top_idx = frames
        .iter()
        .rposition(|f| f.package.as_deref() == Some(top_pkg))?;
    // Highest (nearest-entry) frame in the vulnerable package below it.
    let vuln_idx = frames
        .iter()
        .enumerate()
        .skip(top_idx + 1)
        .find(|(_, f)| f.package.as_deref() == Some(vuln_pkg))
        .map(|(i, _)| i)?;

    let top_anon = is_anonymous(frames[top_idx]);
    let vuln_anon = is_anonymous(frames[vuln_idx]);

    let start = if top_anon {
        // Lowest non-anonymous frame in the top package.
        let named = frames[..=top_idx]
            .iter()
            .rposition(|f| f.package.as_deref() == Some(top_pkg) && !is_anonymous(f))?;
        render(frames[named])
    } else {
        render(frames[top_idx])
    };

    let end = if vuln_anon {
        render(frames[frames.len() - 1])
    } else {
        render(frames[vuln_idx])
    };

    if !top_anon && !vuln_anon && vuln_idx == top_idx + 1 {
        return Some(format!("{start} calls {end}"));
    }

    let middle = if top_anon {
        render_creator(frames[top_idx])
    } else if vuln_anon {
        render_creator(frames[vuln_idx])
    } else {
        render(frames[top_idx + 1])
    };

    Some(format!(
        "{start} calls {middle}, which eventually calls {end}"
    ))
}

fn is_anonymous(frame: &Frame) -> bool {
    frame
        .function
        .as_deref()
        .is_some_and(|name| name.contains('$'))
}

fn render(frame: &Frame) -> String {
    let pkg = frame
        .package
        .as_deref()
        .and_then(|p| p.rsplit('/').next())
        .unwrap_or("");
    let name = frame.function.as_deref().unwrap_or("");
    match &frame.receiver {
        Some(receiver) => format!("{pkg}.{receiver}.{name}"),
        None => format!("{pkg}.{name}"),
    }
}

/// The declared function an anonymous frame was created in.
fn render_creator(frame: &Frame) -> String {
    let creator = frame
        .function
        .as_deref()
        .and_then(|name| name.split('$').next())
        .unwrap_or("");
    render(&Frame {
        function: Some(creator.to_string()),
        ..frame.clone()
    })
}
