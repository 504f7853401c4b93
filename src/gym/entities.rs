//! 健身房业务实体：课程、教练、用户（含购物车）
//!
//! 字段名与远端文档一致（camelCase），本地列名使用 snake_case。

use crate::gym::sync::models::{ColumnDef, EntityKind, SqlValue, SyncEntity};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

/// 课程
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GymClass {
    /// 星期几，例如 "Monday"
    #[serde(default)]
    pub day_of_week: String,
    /// 开始时间，例如 "18:30"
    #[serde(default)]
    pub time: String,
    /// 容量（人数）
    #[serde(default)]
    pub capacity: i64,
    /// 时长（分钟）
    #[serde(default)]
    pub duration: i64,
    #[serde(default)]
    pub price: f64,
    /// 课程类型
    #[serde(rename = "type", default)]
    pub class_type: String,
    #[serde(default)]
    pub description: String,
    /// 授课教练的远端 ID
    #[serde(rename = "instructorID", default)]
    pub instructor_id: String,
    /// 创建时间（毫秒）
    #[serde(default)]
    pub created_time: i64,
}

const CLASS_COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("day_of_week", "TEXT NOT NULL DEFAULT ''"),
    ColumnDef::new("time", "TEXT NOT NULL DEFAULT ''"),
    ColumnDef::new("capacity", "INTEGER NOT NULL DEFAULT 0"),
    ColumnDef::new("duration", "INTEGER NOT NULL DEFAULT 0"),
    ColumnDef::new("price", "REAL NOT NULL DEFAULT 0"),
    ColumnDef::new("class_type", "TEXT NOT NULL DEFAULT ''"),
    ColumnDef::new("description", "TEXT NOT NULL DEFAULT ''"),
    ColumnDef::new("instructor_id", "TEXT NOT NULL DEFAULT ''"),
    ColumnDef::new("created_time", "INTEGER NOT NULL DEFAULT 0"),
];

impl SyncEntity for GymClass {
    const KIND: EntityKind = EntityKind::Class;

    fn columns() -> &'static [ColumnDef] {
        CLASS_COLUMNS
    }

    fn to_values(&self) -> Result<Vec<SqlValue>> {
        Ok(vec![
            SqlValue::Text(self.day_of_week.clone()),
            SqlValue::Text(self.time.clone()),
            SqlValue::Integer(self.capacity),
            SqlValue::Integer(self.duration),
            SqlValue::Real(self.price),
            SqlValue::Text(self.class_type.clone()),
            SqlValue::Text(self.description.clone()),
            SqlValue::Text(self.instructor_id.clone()),
            SqlValue::Integer(self.created_time),
        ])
    }

    fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            day_of_week: row.try_get("day_of_week")?,
            time: row.try_get("time")?,
            capacity: row.try_get("capacity")?,
            duration: row.try_get("duration")?,
            price: row.try_get("price")?,
            class_type: row.try_get("class_type")?,
            description: row.try_get("description")?,
            instructor_id: row.try_get("instructor_id")?,
            created_time: row.try_get("created_time")?,
        })
    }
}

/// 教练
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub age: i64,
    /// 专长
    #[serde(default)]
    pub specialization: String,
    #[serde(default)]
    pub created_time: i64,
}

const TEACHER_COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("name", "TEXT NOT NULL DEFAULT ''"),
    ColumnDef::new("email", "TEXT NOT NULL DEFAULT ''"),
    ColumnDef::new("phone", "TEXT NOT NULL DEFAULT ''"),
    ColumnDef::new("age", "INTEGER NOT NULL DEFAULT 0"),
    ColumnDef::new("specialization", "TEXT NOT NULL DEFAULT ''"),
    ColumnDef::new("created_time", "INTEGER NOT NULL DEFAULT 0"),
];

impl SyncEntity for Teacher {
    const KIND: EntityKind = EntityKind::Teacher;

    fn columns() -> &'static [ColumnDef] {
        TEACHER_COLUMNS
    }

    fn to_values(&self) -> Result<Vec<SqlValue>> {
        Ok(vec![
            SqlValue::Text(self.name.clone()),
            SqlValue::Text(self.email.clone()),
            SqlValue::Text(self.phone.clone()),
            SqlValue::Integer(self.age),
            SqlValue::Text(self.specialization.clone()),
            SqlValue::Integer(self.created_time),
        ])
    }

    fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            phone: row.try_get("phone")?,
            age: row.try_get("age")?,
            specialization: row.try_get("specialization")?,
            created_time: row.try_get("created_time")?,
        })
    }
}

/// 购物车条目
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    /// 课程的远端 ID
    #[serde(rename = "classID", default)]
    pub class_id: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub quantity: i64,
}

/// 购物车
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub total_price: f64,
    #[serde(default)]
    pub total_items: i64,
    #[serde(default, deserialize_with = "crate::gym::types::deserialize_vec_or_null")]
    pub items: Vec<CartItem>,
}

impl Cart {
    /// 按条目重新计算总价与总数
    pub fn recompute_totals(&mut self) {
        self.total_price = self
            .items
            .iter()
            .map(|i| i.price * i.quantity as f64)
            .sum();
        self.total_items = self.items.iter().map(|i| i.quantity).sum();
    }
}

/// 会员用户
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub age: i64,
    /// 外部认证系统中的用户 ID
    #[serde(rename = "authUID", default)]
    pub auth_uid: String,
    #[serde(default)]
    pub created_time: i64,
    #[serde(default, deserialize_with = "crate::gym::types::deserialize_vec_or_null")]
    pub carts: Vec<Cart>,
}

const USER_COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("name", "TEXT NOT NULL DEFAULT ''"),
    ColumnDef::new("email", "TEXT NOT NULL DEFAULT ''"),
    ColumnDef::new("phone", "TEXT NOT NULL DEFAULT ''"),
    ColumnDef::new("age", "INTEGER NOT NULL DEFAULT 0"),
    ColumnDef::new("auth_uid", "TEXT NOT NULL DEFAULT ''"),
    ColumnDef::new("created_time", "INTEGER NOT NULL DEFAULT 0"),
    // 购物车整体以 JSON 文本存储
    ColumnDef::new("carts", "TEXT NOT NULL DEFAULT '[]'"),
];

impl SyncEntity for User {
    const KIND: EntityKind = EntityKind::User;

    fn columns() -> &'static [ColumnDef] {
        USER_COLUMNS
    }

    fn to_values(&self) -> Result<Vec<SqlValue>> {
        let carts = serde_json::to_string(&self.carts).context("序列化购物车失败")?;
        Ok(vec![
            SqlValue::Text(self.name.clone()),
            SqlValue::Text(self.email.clone()),
            SqlValue::Text(self.phone.clone()),
            SqlValue::Integer(self.age),
            SqlValue::Text(self.auth_uid.clone()),
            SqlValue::Integer(self.created_time),
            SqlValue::Text(carts),
        ])
    }

    fn from_row(row: &SqliteRow) -> Result<Self> {
        let carts_json: String = row.try_get("carts")?;
        let carts = if carts_json.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&carts_json).context("解析购物车 JSON 失败")?
        };
        Ok(Self {
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            phone: row.try_get("phone")?,
            age: row.try_get("age")?,
            auth_uid: row.try_get("auth_uid")?,
            created_time: row.try_get("created_time")?,
            carts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_wire_names() {
        let json = r#"{
            "dayOfWeek": "Monday",
            "time": "18:30",
            "capacity": 20,
            "duration": 60,
            "price": 12.5,
            "type": "yoga",
            "description": "Yoga101",
            "instructorID": "t-1",
            "createdTime": 1700000000000
        }"#;
        let class: GymClass = serde_json::from_str(json).unwrap();
        assert_eq!(class.class_type, "yoga");
        assert_eq!(class.instructor_id, "t-1");
        assert_eq!(class.capacity, 20);
    }

    #[test]
    fn test_user_null_carts() {
        let json = r#"{"name": "Ana", "authUID": "uid-9", "carts": null}"#;
        let user: User = serde_json::from_str(json).unwrap();
        assert_eq!(user.auth_uid, "uid-9");
        assert!(user.carts.is_empty());
    }

    #[test]
    fn test_cart_totals() {
        let mut cart = Cart {
            timestamp: 1,
            items: vec![
                CartItem {
                    class_id: "c1".into(),
                    price: 10.0,
                    quantity: 2,
                },
                CartItem {
                    class_id: "c2".into(),
                    price: 5.5,
                    quantity: 1,
                },
            ],
            ..Default::default()
        };
        cart.recompute_totals();
        assert_eq!(cart.total_items, 3);
        assert!((cart.total_price - 25.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_values_follow_column_order() {
        let teacher = Teacher {
            name: "Lia".into(),
            age: 31,
            ..Default::default()
        };
        let values = teacher.to_values().unwrap();
        assert_eq!(values.len(), Teacher::columns().len());
        assert_eq!(values[0], SqlValue::Text("Lia".into()));
        assert_eq!(values[3], SqlValue::Integer(31));
    }
}
