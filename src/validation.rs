//! 输入校验服务
//! 启动时构造一次，通过 AppState 注入到需要校验的组件

use crate::error::{AppError, FieldError};
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

/// 将 validator 的错误翻译为字段级的可读消息
#[derive(Debug, Clone, Default)]
pub struct InputValidator;

impl InputValidator {
    pub fn new() -> Self {
        Self
    }

    /// 校验输入，失败时返回 `AppError::Validation`
    pub fn validate<T: Validate>(&self, input: &T) -> Result<(), AppError> {
        input.validate().map_err(|errors| self.translate(&errors))
    }

    fn translate(&self, errors: &ValidationErrors) -> AppError {
        let mut fields: Vec<FieldError> = errors
            .errors()
            .iter()
            .flat_map(|(field, kind)| match kind {
                ValidationErrorsKind::Field(errs) => errs
                    .iter()
                    .map(|e| FieldError {
                        field: field.to_string(),
                        message: Self::message_for(field, e.code.as_ref(), e.message.as_deref()),
                    })
                    .collect::<Vec<_>>(),
                _ => vec![FieldError {
                    field: field.to_string(),
                    message: format!("{} is invalid", field),
                }],
            })
            .collect();

        // HashMap 迭代顺序不稳定，按字段名排序保证消息稳定
        fields.sort_by(|a, b| a.field.cmp(&b.field));

        let message = fields
            .iter()
            .map(|f| f.message.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        AppError::Validation { message, fields }
    }

    fn message_for(field: &str, code: &str, custom: Option<&str>) -> String {
        if let Some(custom) = custom {
            return format!("{} {}", field, custom);
        }

        match code {
            "required" | "length" => format!("{} is a required field", field),
            "email" => format!("{} must be a valid email address", field),
            other => format!("{} failed on the '{}' check", field, other),
        }
    }
}
