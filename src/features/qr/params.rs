use thiserror::Error;

use crate::config::QrConfig;
use crate::error::AppError;

/// `/qr` 的原始查询参数（已由 HTTP 层做过一次表单解码）
#[derive(Debug, Clone, Default, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct QrQuery {
    /// 需要编码的文本（必填，会再做一次百分号解码）
    #[param(example = "hello%20world")]
    pub data: Option<String>,
    /// 图片边长（像素），无法解析时按默认值处理
    #[param(example = "250")]
    pub size: Option<String>,
    /// 叠加在中心的 Logo 地址（可选，仅支持 png/jpeg/gif）
    #[param(example = "https://example.com/logo.png")]
    pub logo: Option<String>,
}

impl QrQuery {
    /// 从查询键值对构建；同名参数只取第一次出现的值。
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut query = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_str() {
                "data" => &mut query.data,
                "size" => &mut query.size,
                "logo" => &mut query.logo,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value);
            }
        }
        query
    }
}

/// 校验通过后的生成请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrRequest {
    pub data: String,
    pub size: u32,
    pub logo: Option<String>,
}

/// 百分号解码失败
#[derive(Error, Debug, PartialEq, Eq)]
pub enum UnescapeError {
    /// `%` 后不是两位十六进制
    #[error("invalid escape sequence {0:?}")]
    InvalidEscape(String),
    /// 解码结果不是合法 UTF-8
    #[error("decoded data is not valid UTF-8")]
    InvalidUtf8,
}

/// 按查询串规则解码：`+` 视为空格，`%XX` 必须是完整的两位十六进制。
pub fn query_unescape(s: &str) -> Result<String, UnescapeError> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes
                .get(i + 1..i + 3)
                .is_some_and(|h| h.iter().all(u8::is_ascii_hexdigit));
            if !valid {
                let end = (i + 3).min(bytes.len());
                return Err(UnescapeError::InvalidEscape(
                    String::from_utf8_lossy(&bytes[i..end]).into_owned(),
                ));
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    let plus_as_space = s.replace('+', " ");
    let decoded = urlencoding::decode_binary(plus_as_space.as_bytes());
    String::from_utf8(decoded.into_owned()).map_err(|_| UnescapeError::InvalidUtf8)
}

impl QrRequest {
    /// 校验并规范化查询参数。
    ///
    /// size 的两处历史行为保持不变：无法解析时静默回退默认值；越界以 500 返回。
    pub fn from_query(query: QrQuery, limits: &QrConfig) -> Result<Self, AppError> {
        let raw = query
            .data
            .filter(|d| !d.is_empty())
            .ok_or_else(|| AppError::BadRequest("Param data is required".to_string()))?;

        let data = query_unescape(&raw)
            .map_err(|e| AppError::BadRequest(format!("Param data is malformed: {e}")))?;
        if data.is_empty() {
            return Err(AppError::BadRequest("Param data is required".to_string()));
        }

        let size = parse_size(query.size.as_deref(), limits)?;

        // URL 原样透传给回源请求，只有空串视为未提供
        let logo = query.logo.filter(|l| !l.is_empty());

        Ok(Self { data, size, logo })
    }
}

fn parse_size(raw: Option<&str>, limits: &QrConfig) -> Result<u32, AppError> {
    let requested = raw
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<i64>().ok())
        .unwrap_or(i64::from(limits.default_size));

    if requested < i64::from(limits.min_size) {
        return Err(AppError::SizeOutOfRange(format!(
            "Can not generate an qr code image smaller than {0}x{0}",
            limits.min_size
        )));
    }
    if requested > i64::from(limits.max_size) {
        return Err(AppError::SizeOutOfRange(format!(
            "The request size is too big, please set a size smaller than {}.",
            limits.max_size
        )));
    }
    // 区间已由 [min, max] 约束在 u32 内
    u32::try_from(requested).map_err(|e| AppError::Internal(format!("size 转换失败: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(data: Option<&str>, size: Option<&str>, logo: Option<&str>) -> QrQuery {
        QrQuery {
            data: data.map(str::to_string),
            size: size.map(str::to_string),
            logo: logo.map(str::to_string),
        }
    }

    fn parse(q: QrQuery) -> Result<QrRequest, AppError> {
        QrRequest::from_query(q, &QrConfig::default())
    }

    #[test]
    fn from_pairs_keeps_first_value_and_ignores_unknown_keys() {
        let q = QrQuery::from_pairs(vec![
            ("size".into(), "100".into()),
            ("data".into(), "first".into()),
            ("data".into(), "second".into()),
            ("color".into(), "red".into()),
        ]);
        assert_eq!(q.data.as_deref(), Some("first"));
        assert_eq!(q.size.as_deref(), Some("100"));
        assert_eq!(q.logo, None);
    }

    #[test]
    fn unescape_handles_plus_and_hex() {
        assert_eq!(query_unescape("a+b%20c").unwrap(), "a b c");
        assert_eq!(query_unescape("%E4%BD%A0%e5%a5%bd").unwrap(), "你好");
        assert_eq!(query_unescape("plain").unwrap(), "plain");
    }

    #[test]
    fn unescape_rejects_malformed_sequences() {
        assert!(matches!(
            query_unescape("100%"),
            Err(UnescapeError::InvalidEscape(_))
        ));
        assert!(matches!(
            query_unescape("%zz"),
            Err(UnescapeError::InvalidEscape(_))
        ));
        assert!(matches!(
            query_unescape("%4"),
            Err(UnescapeError::InvalidEscape(_))
        ));
        assert_eq!(query_unescape("%ff"), Err(UnescapeError::InvalidUtf8));
    }

    #[test]
    fn missing_or_empty_data_is_bad_request() {
        assert!(matches!(
            parse(query(None, None, None)),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            parse(query(Some(""), None, None)),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            parse(query(Some("%zz"), None, None)),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn size_defaults_and_falls_back_silently() {
        assert_eq!(parse(query(Some("x"), None, None)).unwrap().size, 250);
        assert_eq!(parse(query(Some("x"), Some(""), None)).unwrap().size, 250);
        assert_eq!(parse(query(Some("x"), Some("abc"), None)).unwrap().size, 250);
        assert_eq!(
            parse(query(Some("x"), Some("99999999999999999999"), None))
                .unwrap()
                .size,
            250
        );
        assert_eq!(parse(query(Some("x"), Some("+64"), None)).unwrap().size, 64);
    }

    #[test]
    fn size_bounds_are_inclusive() {
        assert_eq!(parse(query(Some("x"), Some("21"), None)).unwrap().size, 21);
        assert_eq!(parse(query(Some("x"), Some("500"), None)).unwrap().size, 500);

        let err = parse(query(Some("x"), Some("20"), None)).unwrap_err();
        assert!(matches!(err, AppError::SizeOutOfRange(ref m) if m.contains("21x21")));
        let err = parse(query(Some("x"), Some("501"), None)).unwrap_err();
        assert!(matches!(err, AppError::SizeOutOfRange(ref m) if m.contains("500")));
        assert!(matches!(
            parse(query(Some("x"), Some("-5"), None)),
            Err(AppError::SizeOutOfRange(_))
        ));
    }

    #[test]
    fn empty_logo_means_no_logo_and_others_pass_through() {
        assert_eq!(parse(query(Some("x"), None, Some(""))).unwrap().logo, None);
        assert_eq!(
            parse(query(Some("x"), None, Some(" http://a/b.png ")))
                .unwrap()
                .logo
                .as_deref(),
            Some(" http://a/b.png ")
        );
        assert_eq!(
            parse(query(Some("x"), None, Some("http://a/b.png")))
                .unwrap()
                .logo
                .as_deref(),
            Some("http://a/b.png")
        );
    }
}
