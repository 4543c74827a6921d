use lazy_static::lazy_static;
use regex::Regex;
use url::Url;

lazy_static! {
    static ref URL_RE: Regex = Regex::new(r#"https?://[^\s"'<>)\]]+"#).unwrap();
}

/// URLs found in `text`, in order of appearance, without duplicates.
pub fn extract_urls(text: &str) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for m in URL_RE.find_iter(text) {
        let url = m.as_str().trim_end_matches(|c| matches!(c, '.' | ',' | ';' | ':' | '!' | '?'));
        if !urls.iter().any(|u| u == url) {
            urls.push(url.to_string());
        }
    }
    urls
}

/// Lowercased host names of `urls`, de-duplicated, order kept.
pub fn extract_domains(urls: &[String]) -> Vec<String> {
    let mut domains: Vec<String> = Vec::new();
    for raw in urls {
        let host = match Url::parse(raw) {
            Ok(url) => url.host_str().map(|h| h.to_lowercase()),
            Err(_) => None,
        };
        if let Some(host) = host {
            if !domains.contains(&host) {
                domains.push(host);
            }
        }
    }
    domains
}

/// Prompt asking the web-search model to rate the given domains.
pub fn link_risk_prompt(subject: &str, sender: &str, domains: &[String]) -> String {
    format!(
        "다음 이메일에 포함된 링크 도메인의 위험도를 웹 검색으로 조사해줘.\n\
         제목: {}\n발신자: {}\n도메인 목록:\n{}\n\n\
         각 도메인에 대해 알려진 피싱/악성 이력, 등록 정보, 평판을 확인하고 \
         도메인별 위험도(낮음/중간/높음)와 근거를 한국어로 정리해줘.",
        subject,
        sender,
        domains.iter().map(|d| format!("- {}", d)).collect::<Vec<_>>().join("\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_urls_trims_and_dedups() {
        let text = "Login at https://secure-login.example.com/verify?id=1. \
                    Or <a href=\"http://Bit.ly/xyz\">here</a> and again https://secure-login.example.com/verify?id=1";
        let urls = extract_urls(text);
        assert_eq!(
            urls,
            vec![
                "https://secure-login.example.com/verify?id=1".to_string(),
                "http://Bit.ly/xyz".to_string()
            ]
        );
    }

    #[test]
    fn test_extract_domains_lowercases_and_dedups() {
        let urls = vec![
            "http://Bit.ly/xyz".to_string(),
            "https://bit.ly/other".to_string(),
            "https://paypal.com.evil.io/login".to_string(),
        ];
        assert_eq!(extract_domains(&urls), vec!["bit.ly".to_string(), "paypal.com.evil.io".to_string()]);
    }

    #[test]
    fn test_no_links() {
        assert!(extract_urls("plain text, no links. www only").is_empty());
        assert!(extract_domains(&[]).is_empty());
    }
}
