//! User-facing texts

use crate::session::UsageSummary;

/// Instruction sent to the image API alongside the photo and overlay
pub const GENERATION_PROMPT: &str = "\
INSTRUCTIONS: Merge the mask from the second image onto the face of the person in the first image.

REQUIREMENTS:
- Blend the mask with the person's facial contours
- Keep the lighting and shadows of the original photo
- Keep hair, ears and the lower face visible
- Follow the natural curves and angles of the face
- If hair falls over the face, place the mask behind it
- The result should look like the person is actually wearing the mask

Return the same image with the mask applied to this person's face. Do not change the style of the \
original photo and do not add anything else.";

pub const SEND_PHOTO: &str = "Send me your image.";
pub const PROCESSING: &str = "⏳ Processing...";
pub const APPLYING_MASK: &str = "🎭 Applying mask...";
pub const FAILURE: &str = "Sorry, something went wrong. Please try with another image.";

/// "Generations: 1/5 used, 4 remaining"
pub fn usage_line(usage: &UsageSummary) -> String {
    format!(
        "📊 Generations: {}/{} used, {} remaining.",
        usage.used, usage.max, usage.remaining
    )
}

pub fn welcome(usage: &UsageSummary) -> String {
    format!(
        "🎭 Welcome to Mask Bot!\n\n\
         Send me a photo with a face and I'll apply the mask to it automatically.\n\n\
         {}\n\n\
         Just drop your image here to get started! 📸",
        usage_line(usage)
    )
}

pub fn help(usage: &UsageSummary) -> String {
    format!(
        "Send me a photo with a face and I'll add the mask to it automatically.\n\n\
         Commands:\n\
         /start - start over\n\
         /status - show your remaining generations\n\
         /help - show this message\n\n\
         {}",
        usage_line(usage)
    )
}

pub fn status(usage: &UsageSummary) -> String {
    usage_line(usage)
}

pub fn limit_reached(usage: &UsageSummary) -> String {
    format!(
        "🚫 You have used all {} of your generations ({}/{}). Thanks for trying Mask Bot!",
        usage.max, usage.used, usage.max
    )
}

pub fn generated(count: usize) -> String {
    if count == 1 {
        "🎨 Generated 1 variation:".to_string()
    } else {
        format!("🎨 Generated {} variations:", count)
    }
}

/// Sent after a successful generation; `undelivered` counts images that
/// could not be sent
pub fn completion(usage: &UsageSummary, undelivered: usize) -> String {
    let mut text = if usage.remaining == 0 {
        format!(
            "✨ Mask applied! You have now used all {} generations ({}/{}).",
            usage.max, usage.used, usage.max
        )
    } else {
        format!(
            "✨ Mask applied! {} generation(s) remaining ({}/{} used). \
             Send me another image if you want to try again!",
            usage.remaining, usage.used, usage.max
        )
    };

    if undelivered > 0 {
        text.push_str(&format!(
            "\n⚠️ {} image(s) could not be delivered.",
            undelivered
        ));
    }
    text
}
