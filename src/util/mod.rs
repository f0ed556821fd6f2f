use std::error::Error as StdError;

pub mod http;
pub mod text;

/// 串接錯誤與其所有 source
pub fn error_chain(why: &dyn StdError) -> String {
    let mut msg = why.to_string();
    let mut source = why.source();

    while let Some(cause) = source {
        let cause_msg = cause.to_string();
        // 部分錯誤的 Display 已包含 source
        if !msg.ends_with(&cause_msg) {
            msg.push_str(": ");
            msg.push_str(&cause_msg);
        }
        source = cause.source();
    }

    msg
}
