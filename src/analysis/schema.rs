// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Structured-output schema sent with every analysis request

use serde_json::{json, Value};

/// Response schema in the Gemini `responseSchema` dialect
pub fn response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "deviceName": {
                "type": "STRING",
                "description": "The likely name or type of the device based on the board layout and labels."
            },
            "deviceFunction": {
                "type": "STRING",
                "description": "A brief explanation of what this device did."
            },
            "estimatedAge": {
                "type": "STRING",
                "description": "Estimated manufacturing era based on components (e.g., 'Late 90s', 'Modern')."
            },
            "safetyWarnings": {
                "type": "ARRAY",
                "items": { "type": "STRING" },
                "description": "Critical safety warnings for disassembling this specific type of electronics (e.g., capacitors, toxic materials)."
            },
            "parts": {
                "type": "ARRAY",
                "items": part_schema()
            }
        },
        "required": ["deviceName", "deviceFunction", "parts", "safetyWarnings"]
    })
}

fn part_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "name": {
                "type": "STRING",
                "description": "Component name (e.g., '555 Timer IC', 'Stepper Motor')."
            },
            "type": {
                "type": "STRING",
                "description": "Category (e.g., 'Microcontroller', 'Passive', 'Electromechanical')."
            },
            "description": {
                "type": "STRING",
                "description": "What this specific part does."
            },
            "harvestability": {
                "type": "STRING",
                "enum": ["High", "Medium", "Low"],
                "description": "Ease of removal and reuse utility."
            },
            "projectIdeas": {
                "type": "ARRAY",
                "items": { "type": "STRING" },
                "description": "List of 2-3 cool project ideas for this harvested part."
            },
            "box_2d": {
                "type": "ARRAY",
                "items": { "type": "INTEGER" },
                "minItems": 4,
                "maxItems": 4,
                "description": "Location of the part as [ymin, xmin, ymax, xmax] normalized to 0-1000."
            }
        },
        "required": ["name", "type", "description", "harvestability", "projectIdeas"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_level_required_fields() {
        let schema = response_schema();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|v| v.as_str())
            .collect();
        assert_eq!(required, ["deviceName", "deviceFunction", "parts", "safetyWarnings"]);
    }

    #[test]
    fn part_requires_harvestability_enum() {
        let schema = response_schema();
        let part = &schema["properties"]["parts"]["items"];
        assert_eq!(part["properties"]["harvestability"]["enum"], json!(["High", "Medium", "Low"]));
        assert!(part["required"].as_array().unwrap().contains(&json!("projectIdeas")));
        assert!(!part["required"].as_array().unwrap().contains(&json!("box_2d")));
    }
}
