pub mod http_session;
pub mod parser;

#[cfg(feature = "browser")]
pub mod browser_session;

#[cfg(feature = "browser")]
pub use browser_session::{BrowserSession, BrowserSessionFactory};
pub use http_session::{HttpSession, HttpSessionFactory};
pub use parser::HtmlCatalogParser;
