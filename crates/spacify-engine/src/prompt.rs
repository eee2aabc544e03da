const STYLE_GUIDELINES: &[(&str, &str)] = &[
    (
        "Modern Minimalist",
        "Clean lines, neutral colors, uncluttered space, sleek furniture",
    ),
    (
        "Mid-century Modern",
        "Warm wood tones, geometric patterns, vintage accents",
    ),
    (
        "Scandinavian",
        "Light woods, whites and grays, cozy textures, natural light",
    ),
    (
        "Industrial",
        "Exposed brick/metal, dark colors, leather, raw materials",
    ),
    (
        "Bohemian",
        "Rich colors, layered textures, plants, eclectic mix",
    ),
];

const REQUIREMENTS: &[&str] = &[
    "Naturally integrate all the furniture pieces into the room",
    "Place furniture in realistic, functional positions",
    "Ensure proper scale and proportions",
    "Apply appropriate lighting and shadows",
    "Modify wall colors, flooring, or decor elements to match the style",
    "Make the room look lived-in and cohesive",
    "Maintain the original room's architecture and layout",
];

/// Instruction sent alongside the room photo (reference image 1) and the
/// furniture photos (reference images 2..), in that order.
pub fn build_visualization_prompt(style_description: &str, furniture_names: &[&str]) -> String {
    let style = style_description.trim();
    let mut lines = vec![
        "You are an expert interior designer. Generate a new image that shows this room completely transformed with furniture and styling.".to_string(),
        String::new(),
        "TASK: Create a realistic, beautifully styled interior that incorporates the furniture pieces shown and applies the requested design style.".to_string(),
        String::new(),
        format!("STYLE: {style}"),
        String::new(),
        "FURNITURE TO INCLUDE:".to_string(),
    ];
    for (idx, name) in furniture_names.iter().enumerate() {
        lines.push(format!(
            "{}. {} (shown in reference image {})",
            idx + 1,
            name.trim(),
            idx + 2
        ));
    }
    lines.push(String::new());
    lines.push("REQUIREMENTS:".to_string());
    lines.push(format!(
        "1. Transform the room to match the \"{style}\" aesthetic"
    ));
    for (idx, requirement) in REQUIREMENTS.iter().enumerate() {
        lines.push(format!("{}. {requirement}", idx + 2));
    }
    lines.push(String::new());
    lines.push("STYLE GUIDELINES:".to_string());
    for (name, guideline) in STYLE_GUIDELINES {
        lines.push(format!("- If \"{name}\": {guideline}"));
    }
    lines.push(String::new());
    lines.push(
        "Generate a photorealistic image of the completely transformed and furnished room."
            .to_string(),
    );
    lines.join("\n")
}
