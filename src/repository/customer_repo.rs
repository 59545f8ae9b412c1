// ==========================================
// 染整车间生产流程引擎 - 客户来料数据仓储
// ==========================================
// 外部协作方数据: 引擎只读, 回修时改写 receiver_no
// ==========================================

use crate::db::{format_date, parse_date};
use crate::domain::customer::CustomerDetails;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

pub struct CustomerRepository {
    conn: Arc<Mutex<Connection>>,
}

impl CustomerRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 插入客户来料记录
    pub fn insert(&self, customer: &CustomerDetails) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"INSERT INTO customer_details
                   (customer_id, company_name, customer_name, receiver_no, party_dc_no, color, weight, date)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
            params![
                customer.customer_id,
                customer.company_name,
                customer.customer_name,
                customer.receiver_no,
                customer.party_dc_no,
                customer.color,
                customer.weight,
                customer.date.as_ref().map(format_date),
            ],
        )?;
        Ok(())
    }

    /// 按回单号查询
    pub fn find_by_receiver(&self, receiver_no: &str) -> RepositoryResult<Option<CustomerDetails>> {
        let conn = self.get_conn()?;
        let customer = conn
            .query_row(
                r#"SELECT customer_id, company_name, customer_name, receiver_no, party_dc_no, color, weight, date
                   FROM customer_details WHERE receiver_no = ?1"#,
                params![receiver_no],
                map_customer_row,
            )
            .optional()?;
        Ok(customer)
    }

    /// 回单号改名 (回修后新回单号接管客户记录)
    pub fn update_receiver_no(&self, old_receiver: &str, new_receiver: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "UPDATE customer_details SET receiver_no = ?2 WHERE receiver_no = ?1",
            params![old_receiver, new_receiver],
        )?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "CustomerDetails".to_string(),
                id: old_receiver.to_string(),
            });
        }
        Ok(())
    }
}

fn map_customer_row(row: &Row<'_>) -> rusqlite::Result<CustomerDetails> {
    let date: Option<String> = row.get(7)?;
    Ok(CustomerDetails {
        customer_id: row.get(0)?,
        company_name: row.get(1)?,
        customer_name: row.get(2)?,
        receiver_no: row.get(3)?,
        party_dc_no: row.get(4)?,
        color: row.get(5)?,
        weight: row.get(6)?,
        date: date.map(|d| parse_date(7, &d)).transpose()?,
    })
}
