/// SMTP 郵件通知
pub mod email;
