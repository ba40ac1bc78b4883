//! Source documents and converter mocks

use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Smallest payload the converter chain accepts as mp3
pub const MP3_BYTES: &[u8] = b"ID3\x04\x00\x00\x00\x00\x00\x00integration audio";

/// Watch link for a video id
pub fn watch_link(id: &str) -> String {
    format!("https://www.youtube.com/watch?v={id}")
}

/// RSS 2.0 document listing one item per id, oldest first
pub fn rss_document(title: &str, ids: &[&str]) -> String {
    let items: String = ids
        .iter()
        .enumerate()
        .map(|(n, id)| {
            format!(
                "<item><title>Episode {id}</title><link>{link}</link>\
                 <guid>yt:video:{id}</guid><pubDate>1{day} Mar 2021 08:30:00 +0000</pubDate>\
                 <description>notes for {id} https://example.com/{id}?a=1&amp;b=2</description></item>",
                link = watch_link(id),
                day = n
            )
        })
        .collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><rss version=\"2.0\"><channel>\
         <title>{title}</title><link>https://www.youtube.com/channel/{title}</link>\
         <description>{title} uploads</description>{items}</channel></rss>"
    )
}

/// Atom document in the shape of a YouTube channel feed
pub fn atom_document(title: &str, ids: &[&str]) -> String {
    let entries: String = ids
        .iter()
        .map(|id| {
            format!(
                "<entry><id>yt:video:{id}</id><title>Video {id}</title>\
                 <link rel=\"alternate\" href=\"{link}\"/>\
                 <updated>2021-03-10T08:30:00+00:00</updated></entry>",
                link = watch_link(id)
            )
        })
        .collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <feed xmlns=\"http://www.w3.org/2005/Atom\"><id>yt:channel:{title}</id>\
         <title>{title}</title><updated>2021-03-10T08:30:00+00:00</updated>\
         <link rel=\"alternate\" href=\"https://www.youtube.com/channel/{title}\"/>{entries}</feed>"
    )
}

/// Serve `body` as the feed document at `route`
pub async fn mount_source(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/rss+xml")
                .set_body_string(body),
        )
        .mount(server)
        .await;
}

/// Make the ajax converter at `server` finish `link` immediately
pub async fn mount_conversion(server: &MockServer, id: &str) {
    let job = format!("job-{id}");
    Mock::given(method("GET"))
        .and(path("/ajax/download.php"))
        .and(query_param("url", watch_link(id)))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"success": 1, "id": job})),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ajax/progress.php"))
        .and(query_param("id", job.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": 1,
            "progress": 1000,
            "download_url": format!("{}/files/{id}.mp3", server.uri()),
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/files/{id}.mp3")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(MP3_BYTES))
        .mount(server)
        .await;
}
