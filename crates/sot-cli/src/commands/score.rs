/// Local relevance scoring, no host needed
use anyhow::Result;
use sot_relevance::{cosine_similarity, is_on_topic, jaccard_similarity, page_text, tokenize};
use sot_storage::validate_threshold;

pub fn handle_score(goal: &str, title: &str, url: &str, threshold: f64) -> Result<()> {
    validate_threshold(threshold)?;

    let goal_tokens = tokenize(goal);
    let page_tokens = tokenize(&page_text(title, url));
    let verdict = is_on_topic(goal, title, url, threshold);

    println!("Goal tokens: {}", goal_tokens.join(" "));
    println!("Page tokens: {}", page_tokens.join(" "));
    println!();
    println!("  Cosine:  {:.3}", cosine_similarity(&goal_tokens, &page_tokens));
    println!("  Jaccard: {:.3}", jaccard_similarity(&goal_tokens, &page_tokens));
    println!("  Score:   {:.3} (threshold {threshold})", verdict.score);
    println!();
    println!(
        "Verdict: {}",
        if verdict.on_topic { "on topic" } else { "off topic" }
    );
    Ok(())
}
