use photo_captioner_rust::caption::sanitize::sanitize;

#[test]
fn hostile_caption_snapshot() {
    let raw = concat!(
        "<script src=\"https://evil.example/x.js\">alert(1)</script>",
        "<B CLASS=\"title\">Sunset</B> over the bay",
        "<br/>",
        "<img src=x onerror=alert(2)>",
        "<small onclick=\"steal()\">12 May 2024 · Lisbon</small>",
    );
    insta::assert_snapshot!(sanitize(raw));
}
