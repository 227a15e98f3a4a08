use std::collections::HashSet;

use crate::errors::DomainError;
use crate::value_objects::{ChatId, UserId};

/// 聊天至少需要的成员数
pub const MIN_CHAT_MEMBERS: usize = 2;

/// 固定成员的聊天。
///
/// 成员列表在创建时确定，之后不再增删；顺序即插入顺序。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Chat {
    pub id: ChatId,
    pub members: Vec<UserId>,
}

impl Chat {
    /// 创建聊天并校验成员规则：至少两人、不能重复。
    ///
    /// 成员是否存在由应用层检查，这里只做纯数据校验。
    pub fn new(id: ChatId, members: Vec<UserId>) -> Result<Self, DomainError> {
        Self::validate_members(&members)?;
        Ok(Self { id, members })
    }

    /// 先检查数量，再按列表顺序查找第一个重复成员。
    pub fn validate_members(members: &[UserId]) -> Result<(), DomainError> {
        if members.len() < MIN_CHAT_MEMBERS {
            return Err(DomainError::invalid_argument(
                "members",
                format!("chat must have at least {MIN_CHAT_MEMBERS} members"),
            ));
        }

        let mut seen = HashSet::with_capacity(members.len());
        for member in members {
            if !seen.insert(member) {
                return Err(DomainError::invalid_argument(
                    "members",
                    format!("duplicate member {member}"),
                ));
            }
        }
        Ok(())
    }

    pub fn has_member(&self, user_id: &UserId) -> bool {
        self.members.iter().any(|member| member == user_id)
    }
}
