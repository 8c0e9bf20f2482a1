//! Prompt templates for every model call the server makes.
//!
//! User-facing output is Vietnamese; root analysis and image-prompt
//! optimisation are phrased in English because their output is parsed or
//! fed to another model.

use std::fmt::Write;

use serde::Deserialize;

/// Appended to every optimised image prompt before calling Imagen.
pub const CARTOON_STYLE_SUFFIX: &str = "\n\nStyle: Cute cartoon illustration, adorable characters, bright cheerful colors, simple clean art style, suitable for all ages, expressive and engaging, digital art, high quality";

// =============================================================================
// STREAMED EXPLANATIONS
// =============================================================================

#[must_use]
pub fn grammar(selected_text: &str, paragraph_content: &str) -> String {
    format!(
        "
Phân tích ngữ pháp tiếng Anh cho phần văn bản được chọn: \"{selected_text}\".

Bối cảnh của văn bản:
\"{paragraph_content}\"

Hãy phân tích ngữ pháp bằng tiếng Việt với:

📚 **Phân tích cấu trúc ngữ pháp:**
- Xác định các thành phần chính (chủ ngữ, vị ngữ, bổ ngữ...)
- Loại câu và cấu trúc câu
- Thì, thể, cách của động từ (nếu có)

✨ **Giải thích chi tiết:**
- Tại sao sử dụng cấu trúc này?
- Ý nghĩa và cách dùng của các từ ngữ pháp
- Quy tắc ngữ pháp áp dụng

🎯 **Ví dụ tương tự:**
- Đưa ra 1-2 ví dụ có cấu trúc tương tự
- So sánh với tiếng Việt (nếu thích hợp)

Trả lời bằng tiếng Việt, sử dụng emoji cho sinh động, có sense of humor nhẹ nhàng nhưng vẫn giáo dục. Dùng markdown để format đẹp với bullet points.
"
    )
}

#[must_use]
pub fn explain(selected_text: &str, paragraph_content: &str) -> String {
    format!(
        "
Dịch mượt mà sang tiếng Việt và giải thích cho mình phần văn bản được chọn: \"{selected_text}\".
Bối cảnh của văn bản:
\"{paragraph_content}\"
- Dịch trước, sau đó giải thích.
- Dịch mượt mà, thay đổi cấu trúc câu, cách diễn đạt, từ ngữ nếu cần.
- Giải thích tập trung, không lan man.
- Sử dụng câu từ, văn phong mượt mà.
- Hãy thêm icon cho sinh động, và có chia các phần bằng các icon khác nhau.
- Có các gạch đầu dòng dạng list cho sinh động.
- KHÔNG SỬ DỤNG dấu gạch ngang \"---\" hoặc bất kỳ dấu phân cách ngang nào khác.

Trả lời cho mình bằng tiếng Việt và có thể sử dụng định dạng markdown.
"
    )
}

/// `full_context` carries the whole article with the target paragraph
/// fenced by `>>> ĐOẠN CẦN DỊCH START <<<` / `>>> ĐOẠN CẦN DỊCH END <<<`.
/// Without it the paragraph alone is used.
#[must_use]
pub fn translate(paragraph_markdown: &str, full_context: Option<&str>) -> String {
    let context = full_context.filter(|c| !c.is_empty()).unwrap_or(paragraph_markdown);
    format!(
        "
Bạn là một chuyên gia dịch thuật tiếng Việt. Hãy dịch đoạn văn được đánh dấu trong ngữ cảnh hoàn chỉnh của bài viết.

**TOÀN BỘ NGỮ CẢNH CỦA BÀI VIẾT:**
{context}

**YÊU CẦU:**
- CHỈ dịch đoạn văn nằm giữa \">>> ĐOẠN CẦN DỊCH START <<<\" và \">>> ĐOẠN CẦN DỊCH END <<<\"
- KHÔNG dịch các đoạn văn khác trong ngữ cảnh
- Giữ nguyên định dạng markdown của văn bản gốc (in đậm, in nghiêng, code, v.v.)
- Dịch một cách tự nhiên và mượt mà, phù hợp với toàn bộ ngữ cảnh xung quanh
- Thay đổi cấu trúc câu, cách diễn đạt nếu cần để phù hợp với tiếng Việt
- Sử dụng ngữ cảnh toàn bài để hiểu đúng thuật ngữ, chủ đề và phong cách viết
- Đảm bảo sự liên kết logic và thống nhất với toàn bộ bài viết
- Trả về CHÍNH XÁC định dạng markdown, không thêm gì khác

**LƯU Ý QUAN TRỌNG:** Chỉ trả về bản dịch tiếng Việt của đoạn văn được đánh dấu, không bao gồm các dấu hiệu đánh dấu."
    )
}

/// One turn of a chat history.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[must_use]
pub fn chat(messages: &[ChatMessage]) -> String {
    let mut prompt = String::from(
        "Bạn là trợ lý AI thân thiện, hài hước và giàu năng lượng.\n\
         - Luôn trả lời bằng tiếng Việt rõ ràng, súc tích.\n\
         - Có thể sử dụng markdown, bullet list, và icon cảm xúc (ví dụ: 😀😉🔥💡🚀) để làm câu trả lời sinh động và vui vẻ.\n\
         - Tuyệt đối KHÔNG sử dụng dấu gạch ngang \"---\" làm phân cách.\n\n\
         Cuộc hội thoại:\n",
    );
    for message in messages {
        let speaker = if message.role == "user" { "Người dùng" } else { "Trợ lý" };
        let _ = writeln!(prompt, "{speaker}: {}", message.content);
    }
    prompt.push_str("Trợ lý:");
    prompt
}

// =============================================================================
// STRUCTURED CALLS
// =============================================================================

/// Ask for a single `[text|meaning]` marker.
#[must_use]
pub fn annotation_retry(text: &str, paragraph_content: &str) -> String {
    format!(
        "Hãy chú thích cho mình phần văn bản tiếng Anh sau: \"{text}\", có thể là từ, cụm từ, hoặc một biểu đạt chưa hoàn chỉnh.
Hãy output cho mình theo format này: [{text}|nghĩa tiếng việt]
Chỉ output đúng format, không output thêm nội dung nào khác.
Lưu ý cần dịch mượt mà, đúng ngữ cảnh, không lan man.
Phần văn bản cần được dịch chính xác theo bối cảnh (context).

Bối cảnh (context) có chứa từ cần chú thích:
{paragraph_content}"
    )
}

#[must_use]
pub fn root_analysis(selected_text: &str, paragraph_content: &str) -> String {
    format!(
        r#"Analyze the word root for: "{selected_text}"

Context: "{paragraph_content}"

Return a JSON response with this exact structure:
{{
  "viMeaning": "Vietnamese meaning of the word",
  "prefixText": "exact prefix in word or null",
  "rootText": "exact root in word",
  "connection": "brief Vietnamese explanation of prefix + root = meaning",
  "sameRoot": [
    {{
      "word": "related word 1",
      "viMeaning": "meaning in Vietnamese",
      "prefixText": "prefix or null",
      "rootText": "root text",
      "connection": "connection explanation"
    }}
  ]
}}

Requirements:
- prefixText and rootText must appear exactly in the analyzed word
- sameRoot should contain exactly 5 words (not prefix)
- All explanations in Vietnamese
- If no prefix exists, use null for prefixText
- connection's short and will be similar like this format: ad ("Hướng đến") + vi ("Nhìn / thấy") -> Hướng đến việc được thấy = Lời khuyên
- Return only valid JSON, no additional text"#
    )
}

#[must_use]
pub fn image_prompt(selected_text: &str, full_context: &str) -> String {
    format!(
        "
You are an expert at creating image generation prompts. Your task is to convert the given text into a detailed, visual prompt that will generate a cute cartoon-style illustration.

SELECTED TEXT: \"{selected_text}\"
FULL CONTEXT: \"{full_context}\"

INSTRUCTIONS:
1. Focus primarily on the SELECTED TEXT, but use the full context for additional understanding
2. Create a prompt for a cute cartoon-style illustration with adorable characters
3. The style should be:
   - Cute and friendly cartoon characters
   - Bright, cheerful colors
   - Simple, clean art style
   - Suitable for all ages
   - Expressive and engaging

4. Include specific visual elements that represent the key concepts from the selected text
5. Keep the prompt concise but descriptive (under 200 words)

Generate ONLY the image prompt, no additional explanation:"
    )
}

#[cfg(test)]
#[path = "prompts_test.rs"]
mod tests;
