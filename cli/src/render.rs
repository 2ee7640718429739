use shared::{ClassPrediction, PredictionSet, PredictionsSnapshot, StatusInfo};

/// Width of the bar between the brackets.
pub const BAR_WIDTH: usize = 10;

/// Renders `label: [#####     ] 53%`. Probabilities outside `[0, 1]` are
/// clamped.
pub fn bar(prediction: &ClassPrediction) -> String {
    let p = prediction.probability.clamp(0.0, 1.0);
    let filled = (p * BAR_WIDTH as f32).round() as usize;
    format!(
        "{}: [{}{}] {:.0}%",
        prediction.class_name,
        "#".repeat(filled),
        " ".repeat(BAR_WIDTH - filled),
        p * 100.0
    )
}

fn section(out: &mut Vec<String>, title: &str, set: &PredictionSet) {
    out.push(format!("{}:", title));
    out.extend(set.iter().map(|p| format!("  {}", bar(p))));
}

pub fn predictions(snapshot: &PredictionsSnapshot) -> String {
    let mut out = Vec::new();

    match &snapshot.image {
        Some(set) => section(&mut out, "Image", set),
        None => out.push("Image: no predictions yet".to_string()),
    }
    if let Some(set) = &snapshot.pose {
        section(&mut out, "Pose", set);
    }
    if let Some(text) = &snapshot.last_utterance {
        out.push(format!("Last spoken: {}", text));
    }

    out.join("\n")
}

pub fn status(info: &StatusInfo) -> String {
    let mut out = vec![
        "Status:".to_string(),
        format!("  Running: {}", info.is_running),
        format!("  Active: {}", info.is_active),
        format!("  Mode: {}", info.mode),
        format!("  Image classifier: {}", info.image_classifier),
    ];
    if let Some(pose) = &info.pose_classifier {
        out.push(format!("  Pose classifier: {}", pose));
    }
    if let Some(text) = &info.last_utterance {
        out.push(format!("  Last spoken: {}", text));
    }
    out.join("\n")
}
