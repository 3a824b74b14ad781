/// The identity a filter decision is made against: the client's device
/// family, browser family and browser version, as reported by the
/// user-agent parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub device_family: String,
    pub browser_family: String,
    pub browser_version: String,
}

impl ClientIdentity {
    pub fn new(
        device_family: impl Into<String>,
        browser_family: impl Into<String>,
        browser_version: impl Into<String>,
    ) -> Self {
        Self {
            device_family: device_family.into(),
            browser_family: browser_family.into(),
            browser_version: browser_version.into(),
        }
    }
}

/// Boundary to whatever user-agent parser the host application uses.
///
/// Parsing is infallible: agents that cannot be classified resolve to the
/// `"Other"` families with an empty version, never to an error.
pub trait UserAgentParser {
    fn parse(&self, user_agent: &str) -> ClientIdentity;
}

impl<T: UserAgentParser + ?Sized> UserAgentParser for &T {
    fn parse(&self, user_agent: &str) -> ClientIdentity {
        (**self).parse(user_agent)
    }
}

/// Adapter over the `ua-parser` crate. The browser version joins the
/// non-empty major/minor/patch components with dots; families of
/// unmatched agents come back as `"Other"`.
#[cfg(feature = "uap")]
impl UserAgentParser for ua_parser::Extractor<'_> {
    fn parse(&self, user_agent: &str) -> ClientIdentity {
        let device_family = match self.dev.extract(user_agent) {
            Some(device) => device.device.into_owned(),
            None => String::from("Other"),
        };
        let (browser_family, browser_version) = match self.ua.extract(user_agent) {
            Some(ua) => {
                let version = [ua.major, ua.minor, ua.patch]
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
                    .join(".");
                (ua.family.into_owned(), version)
            }
            None => (String::from("Other"), String::new()),
        };
        ClientIdentity {
            device_family,
            browser_family,
            browser_version,
        }
    }
}
