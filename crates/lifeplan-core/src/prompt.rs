//! Prompt construction. Every function here is pure.
//!
//! Field lists are rendered from the manifests in [`crate::schema`], so a
//! field added to a manifest shows up in the prompt and in validation at
//! the same time.

use chrono::DateTime;
use chrono_tz::Tz;
use serde_json::Value;

use crate::context::UserContext;
use crate::grocery::GroceryFocus;
use crate::intent::ItemType;
use crate::schema::{self, FieldSpec, Schema};

/// Today's date as shown to the model, e.g. `Friday, October 16, 2026`.
pub fn today_label(now: &DateTime<Tz>) -> String {
    now.format("%A, %B %-d, %Y").to_string()
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Section heading for each of the ten shapes, in prompt order.
const ITEM_HEADINGS: [(ItemType, &str); 7] = [
    (ItemType::Task, "TASKS"),
    (ItemType::Goal, "GOALS"),
    (ItemType::Commitment, "COMMITMENTS & SCHEDULE"),
    (ItemType::Grocery, "GROCERIES"),
    (ItemType::Expense, "EXPENSES"),
    (ItemType::Reminder, "REMINDERS"),
    (ItemType::Notification, "NOTIFICATIONS"),
];

pub fn classification_prompt(
    context: &UserContext,
    user_input: &str,
    today: &str,
    timezone: &str,
) -> String {
    let mut p = String::new();
    p.push_str(
        "You are an expert AI Life Planner assistant. Analyze the user's message and respond \
         with a single, valid JSON object that represents their intent.\n\n",
    );

    p.push_str("Full User Context:\n");
    p.push_str(&format!("- Today's Date: {today}\n"));
    p.push_str(&format!("- User Profile: {}\n", json(&context.profile)));
    p.push_str(&format!("- Recent Tasks: {}\n", json(&context.recent_tasks)));
    p.push_str(&format!("- Pending Groceries: {}\n", json(&context.pending_groceries)));
    p.push_str(&format!("- Recent Expenses: {}\n", json(&context.recent_expenses)));
    p.push_str(&format!("- Upcoming Commitments: {}\n", json(&context.upcoming_commitments)));
    p.push_str(&format!("- Learning Plans: {}\n", json(&context.recent_learning_plans)));
    p.push_str(&format!("\nUser Message: {}\n\n", json(&user_input)));

    p.push_str("Respond with exactly ONE of these JSON formats based on intent:\n\n");

    let mut n = 0;
    for (item_type, heading) in ITEM_HEADINGS {
        n += 1;
        p.push_str(&format!(
            "{n}. {heading}:\n   {{ \"intent\": \"create_item\", \"type\": \"{item_type}\", \"data\": {{\n{}   }} }}\n\n",
            field_lines(item_type.schema(), "       ")
        ));
    }

    n += 1;
    p.push_str(&format!(
        "{n}. LEARNING PLANS:\n   {{ \"intent\": \"generate_learning_plan\", \"plan_details\": {{\n{}   }} }}\n\n",
        field_lines(&schema::PLAN_DETAILS, "       ")
    ));

    n += 1;
    p.push_str(&format!(
        "{n}. ANALYTICS & INSIGHTS:\n   {{ \"intent\": \"analyze_data\",\n{}   }}\n\n",
        field_lines(&schema::ANALYTICS, "     ")
    ));

    n += 1;
    p.push_str(&format!(
        "{n}. QUESTIONS & CONVERSATION:\n   {{ \"intent\": \"answer_question\",\n{}   }}\n\n",
        field_lines(&schema::QUESTION, "     ")
    ));

    p.push_str("Rules:\n");
    p.push_str("- Return ONLY the JSON object, with no text before or after it\n");
    p.push_str("- Match exactly one of the formats above\n");
    p.push_str("- Use today's date as the reference for relative dates\n");
    p.push_str(&format!("- For times, use ISO format in the {timezone} timezone\n"));
    p.push_str("- Fields marked required must always be present\n");
    p.push_str("- Consider the user's existing data when making suggestions\n");
    p.push_str("- If the request is unclear, answer conversationally with answer_question\n");
    p
}

fn field_lines(schema: &Schema, indent: &str) -> String {
    let mut out = String::new();
    for spec in schema.fields {
        out.push_str(&format!("{indent}{}\n", field_line(spec)));
    }
    out
}

fn field_line(spec: &FieldSpec) -> String {
    format!(
        "\"{}\": <{}, {}> {}",
        spec.name,
        spec.kind.label(),
        if spec.required { "required" } else { "optional" },
        spec.hint
    )
}

fn json<T: serde::Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_owned())
}

// ---------------------------------------------------------------------------
// Learning plans
// ---------------------------------------------------------------------------

const DSA_KEYWORDS: [&str; 3] = ["data struct", "dsa", "algorithm"];

const DSA_AREAS: [&str; 10] = [
    "Complexity Analysis & Big-O",
    "Arrays & Strings",
    "Linked Lists",
    "Stacks & Queues",
    "Recursion & Backtracking",
    "Trees & Graphs",
    "Sorting & Searching",
    "Dynamic Programming",
    "Greedy Algorithms",
    "Advanced Topics (Tries, Segment Trees, etc.)",
];

/// Whether `topic` gets the data-structures-and-algorithms template.
pub fn is_dsa_topic(topic: &str) -> bool {
    let topic = topic.to_lowercase();
    DSA_KEYWORDS.iter().any(|k| topic.contains(k))
}

/// Prompt asking for exactly `weeks` milestone objects as a JSON array.
pub fn learning_prompt(topic: &str, duration_text: &str, weeks: u32) -> String {
    let mut p = String::new();
    if is_dsa_topic(topic) {
        p.push_str(&format!(
            "You are an expert computer science educator specializing in Data Structures and \
             Algorithms (DSA).\nCreate a comprehensive, week-by-week DSA mastery plan for \
             \"{topic}\" over \"{duration_text}\". The plan MUST contain exactly {weeks} weeks.\n\n"
        ));
    } else {
        p.push_str(&format!(
            "You are an expert learning experience designer.\nCreate a comprehensive, \
             week-by-week learning plan for: {topic}\nDuration: {duration_text}. The plan MUST \
             contain exactly {weeks} weeks.\n\n"
        ));
    }

    p.push_str(
        "CRITICAL: You MUST return ONLY a valid JSON array. Do not include any text before or \
         after the JSON.\n\nFor each week, provide:\n",
    );
    for spec in schema::MILESTONE.fields {
        p.push_str(&format!("- `{}`: {} ({}).\n", spec.name, spec.hint, spec.kind.label()));
    }

    if is_dsa_topic(topic) {
        p.push_str(&format!(
            "\nCover these core DSA areas progressively over {weeks} weeks:\n"
        ));
        for (i, area) in DSA_AREAS.iter().enumerate() {
            p.push_str(&format!("{}. {area}\n", i + 1));
        }
        p.push_str(
            "\nEach week should include theoretical concepts, hands-on implementation, \
             problem-solving practice and common interview questions.\n",
        );
    } else {
        p.push_str(
            "\nMake it practical, progressive, and achievable. Ensure each week has 3-5 \
             specific tasks.\n",
        );
    }

    p.push_str(
        "\nReturn ONLY the JSON array with no additional text, markdown formatting, or \
         explanations.\n",
    );
    p
}

// ---------------------------------------------------------------------------
// Grocery plans
// ---------------------------------------------------------------------------

pub fn grocery_prompt(
    focus: &GroceryFocus,
    current_groceries: &[Value],
    user_input: &str,
    today: &str,
) -> String {
    let mut p = String::new();
    p.push_str(&format!(
        "You are an expert Indian nutritionist, meal planner, and budget advisor. Today is {today}.\n\n"
    ));
    p.push_str(&format!("{}\n\n", focus.context_text()));
    p.push_str(&format!("CURRENT GROCERIES (Unbought):\n{}\n\n", json(current_groceries)));
    p.push_str(&format!("USER REQUEST: {}\n\n", json(&user_input)));

    p.push_str(&format!(
        "Generate a week-long grocery shopping list that is:\n\
         1. Nutritionally aligned with the {} focus\n\
         2. Budget-conscious with realistic Indian market prices\n\
         3. Practical for simple, healthy Indian meals\n\
         4. Complementary to the current groceries (no duplicates)\n\n",
        focus.label
    ));

    p.push_str(
        "PRICING GUIDELINES:\n\
         - Vegetables: ₹20-80 per 500g\n\
         - Fruits: ₹40-120 per kg\n\
         - Grains/Pulses: ₹80-200 per kg\n\
         - Dairy: ₹25-60 per 500ml/250g\n\
         - Proteins: ₹150-400 per kg\n\n",
    );

    if let Some(advice) = focus.advice() {
        p.push_str(&format!("GOAL-SPECIFIC CONSIDERATIONS:\n{advice}\n\n"));
    }

    p.push_str("Return ONLY a valid JSON object in this exact format:\n{\n  \"grocery_plan\": [\n");
    p.push_str(&format!(
        "    {{ {} }}\n",
        schema::GROCERY_PLAN_ITEM
            .fields
            .iter()
            .map(|f| match f.kind {
                schema::FieldKind::Text => format!("\"{}\": \"{}\"", f.name, f.hint),
                _ => format!("\"{}\": {}", f.name, f.hint),
            })
            .collect::<Vec<_>>()
            .join(", ")
    ));
    p.push_str("  ]\n}\n\n");
    p.push_str(
        "Include 10-15 items covering proteins, vegetables, grains, dairy, healthy fats and \
         fruits.\n",
    );
    p
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Asia::Kolkata;
    use serde_json::json;

    #[test]
    fn today_label_format() {
        let now = Kolkata.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap();
        assert_eq!(today_label(&now), "Friday, October 16, 2026");
    }

    #[test]
    fn classification_prompt_lists_ten_shapes() {
        let p = classification_prompt(&UserContext::default(), "buy milk", "Friday", "Asia/Kolkata");
        for n in 1..=10 {
            assert!(p.contains(&format!("\n{n}. ")), "missing shape {n}");
        }
        assert!(!p.contains("\n11. "));
        for item_type in ItemType::ALL {
            assert!(p.contains(&format!("\"type\": \"{item_type}\"")));
            for spec in item_type.schema().fields {
                assert!(p.contains(&format!("\"{}\":", spec.name)));
            }
        }
        assert!(p.contains("\"intent\": \"generate_learning_plan\""));
        assert!(p.contains("\"intent\": \"analyze_data\""));
        assert!(p.contains("\"intent\": \"answer_question\""));
        assert!(p.contains("User Message: \"buy milk\""));
        assert!(p.contains("Asia/Kolkata"));
    }

    #[test]
    fn classification_prompt_embeds_context() {
        let mut ctx = UserContext::default();
        ctx.pending_groceries = vec![json!({ "item_name": "Milk" }).as_object().unwrap().clone()];
        let p = classification_prompt(&ctx, "hi", "today", "UTC");
        assert!(p.contains(r#"Pending Groceries: [{"item_name":"Milk"}]"#));
    }

    #[test]
    fn dsa_topic_detection() {
        assert!(is_dsa_topic("Data Structures and Algorithms"));
        assert!(is_dsa_topic("DSA for interviews"));
        assert!(!is_dsa_topic("Watercolor painting"));
    }

    #[test]
    fn learning_prompt_lists_every_milestone_field() {
        for topic in ["DSA", "Spanish"] {
            let p = learning_prompt(topic, "2 months", 8);
            assert!(p.contains("exactly 8 weeks"));
            for spec in schema::MILESTONE.fields {
                assert!(p.contains(&format!("`{}`", spec.name)), "{topic}: {}", spec.name);
            }
        }
        assert!(learning_prompt("DSA", "1 month", 4).contains("Dynamic Programming"));
        assert!(!learning_prompt("Spanish", "1 month", 4).contains("Dynamic Programming"));
    }

    #[test]
    fn grocery_prompt_mentions_focus_and_current_items() {
        let focus = crate::grocery::infer_focus("cheap muscle gain plan", None);
        let p = grocery_prompt(&focus, &[json!({ "item_name": "Eggs" })], "cheap muscle gain plan", "today");
        assert!(p.contains("muscle gain"));
        assert!(p.contains(r#"[{"item_name":"Eggs"}]"#));
        assert!(p.contains("\"grocery_plan\""));
        assert!(p.contains("\"item_name\": \"Paneer\""));
        assert!(p.contains("paneer, dal, quinoa"));
    }
}
