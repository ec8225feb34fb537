use pulldown_cmark::{html, Event, Options, Parser};

/// Renders a markdown reply to HTML. Single newlines inside a paragraph become `<br />`, which is
/// how the chat frontend expects model output to wrap.
pub fn markdown_to_html(markdown: &str) -> String {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
    let parser = Parser::new_ext(markdown, options).map(|event| match event {
        Event::SoftBreak => Event::HardBreak,
        other => other,
    });

    let mut output = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut output, parser);
    output
}
