use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{Column, ConnectOptions, Connection, Executor, Row, TypeInfo, ValueRef};

use crate::domain::session::{DmlSession, SessionRow, SqlScalar};
use crate::infrastructure::my_cnf::read_my_cnf;

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 3306;

/// Connection parameters assembled from flags and, when given, a MySQL
/// options file. File values fill only the fields no flag has set.
#[derive(Debug, Clone, Default)]
pub struct MySqlSettings {
    pub user: Option<String>,
    pub password: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub socket: Option<String>,
    pub database: String,
    pub defaults_file: Option<PathBuf>,
}

impl MySqlSettings {
    fn merge_defaults_file(mut self) -> Result<Self> {
        let Some(path) = self.defaults_file.take() else {
            return Ok(self);
        };
        let values = read_my_cnf(&path)?;
        self.user = self.user.or(values.user);
        self.password = self.password.or(values.password);
        self.host = self.host.or(values.host);
        self.port = self.port.or(values.port);
        self.socket = self.socket.or(values.socket);
        if self.database.is_empty() {
            self.database = values.database.unwrap_or_default();
        }
        Ok(self)
    }
}

/// One MySQL connection, used for everything: session variables, the table
/// lock and the chunk statements are all scoped to it, so pooling would
/// break the engine.
pub struct MySqlSession {
    connection: MySqlConnection,
}

impl MySqlSession {
    pub async fn connect(settings: MySqlSettings) -> Result<Self> {
        let settings = settings.merge_defaults_file()?;
        let host = settings.host.as_deref().unwrap_or(DEFAULT_HOST);

        let mut options = MySqlConnectOptions::new()
            .host(host)
            .port(settings.port.unwrap_or(DEFAULT_PORT))
            .database(&settings.database);
        if let Some(user) = &settings.user {
            options = options.username(user);
        }
        if let Some(password) = &settings.password {
            options = options.password(password);
        }
        if host == DEFAULT_HOST {
            if let Some(socket) = &settings.socket {
                options = options.socket(socket);
            }
        }

        let mut connection = options.connect().await.context("MySQL connection error")?;
        connection.ping().await.context("MySQL connection error")?;
        Ok(Self { connection })
    }

    pub async fn close(self) -> Result<()> {
        self.connection.close().await.map_err(Into::into)
    }
}

#[async_trait]
impl DmlSession for MySqlSession {
    // Engine-generated statements carry their values inline (SELECT ... INTO
    // and LOCK TABLES cannot be prepared), so they run over the text
    // protocol; the schema lookups below use prepared statements.
    async fn exec(&mut self, statement: &str) -> Result<u64> {
        let result = self.connection.execute(statement).await?;
        Ok(result.rows_affected())
    }

    async fn query_row(&mut self, query: &str) -> Result<Option<SessionRow>> {
        let row = self.connection.fetch_optional(query).await?;
        row.as_ref().map(row_to_scalars).transpose()
    }

    async fn query_rows(&mut self, query: &str) -> Result<Vec<SessionRow>> {
        let rows = self.connection.fetch_all(query).await?;
        rows.iter().map(row_to_scalars).collect()
    }

    async fn table_exists(&mut self, database: &str, table: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_SCHEMA=? AND TABLE_NAME=?",
        )
        .bind(database)
        .bind(table)
        .fetch_one(&mut self.connection)
        .await?;
        Ok(count > 0)
    }

    async fn possible_unique_key_columns(
        &mut self,
        database: &str,
        table: &str,
    ) -> Result<Vec<SessionRow>> {
        let rows = sqlx::query(POSSIBLE_UNIQUE_KEYS)
            .bind(database)
            .bind(table)
            .fetch_all(&mut self.connection)
            .await?;
        rows.iter().map(row_to_scalars).collect()
    }

    async fn lock_table_read(&mut self, database: &str, table: &str) -> Result<()> {
        self.connection
            .execute(format!("LOCK TABLES `{database}`.`{table}` READ").as_str())
            .await?;
        Ok(())
    }

    async fn unlock_tables(&mut self) -> Result<()> {
        self.connection.execute("UNLOCK TABLES").await?;
        Ok(())
    }
}

/// Every unique index on the table, one row per index, described by its
/// first column and ranked so the preferred chunking key comes first:
/// PRIMARY beats other uniques, no character set beats having one, narrower
/// integer types beat wider ones, fewer index columns beat more.
const POSSIBLE_UNIQUE_KEYS: &str = r#"
SELECT
  COLUMNS.TABLE_SCHEMA,
  COLUMNS.TABLE_NAME,
  COLUMNS.COLUMN_NAME,
  UNIQUES.INDEX_NAME,
  UNIQUES.COLUMN_NAMES,
  UNIQUES.COUNT_COLUMN_IN_INDEX,
  COLUMNS.DATA_TYPE,
  COLUMNS.CHARACTER_SET_NAME
FROM INFORMATION_SCHEMA.COLUMNS INNER JOIN (
  SELECT
    TABLE_SCHEMA,
    TABLE_NAME,
    INDEX_NAME,
    COUNT(*) AS COUNT_COLUMN_IN_INDEX,
    GROUP_CONCAT(COLUMN_NAME ORDER BY SEQ_IN_INDEX ASC) AS COLUMN_NAMES,
    SUBSTRING_INDEX(GROUP_CONCAT(COLUMN_NAME ORDER BY SEQ_IN_INDEX ASC), ',', 1) AS FIRST_COLUMN_NAME
  FROM INFORMATION_SCHEMA.STATISTICS
  WHERE NON_UNIQUE=0
  GROUP BY TABLE_SCHEMA, TABLE_NAME, INDEX_NAME
) AS UNIQUES
ON (
  COLUMNS.TABLE_SCHEMA = UNIQUES.TABLE_SCHEMA AND
  COLUMNS.TABLE_NAME = UNIQUES.TABLE_NAME AND
  COLUMNS.COLUMN_NAME = UNIQUES.FIRST_COLUMN_NAME
)
WHERE
  COLUMNS.TABLE_SCHEMA = ?
  AND COLUMNS.TABLE_NAME = ?
ORDER BY
  COLUMNS.TABLE_SCHEMA, COLUMNS.TABLE_NAME,
  CASE UNIQUES.INDEX_NAME
    WHEN 'PRIMARY' THEN 0
    ELSE 1
  END,
  CASE IFNULL(CHARACTER_SET_NAME, '')
    WHEN '' THEN 0
    ELSE 1
  END,
  CASE DATA_TYPE
    WHEN 'tinyint' THEN 0
    WHEN 'smallint' THEN 1
    WHEN 'int' THEN 2
    WHEN 'bigint' THEN 3
    ELSE 100
  END,
  COUNT_COLUMN_IN_INDEX
"#;

fn row_to_scalars(row: &MySqlRow) -> Result<SessionRow> {
    let mut values = HashMap::with_capacity(row.columns().len());
    for (index, column) in row.columns().iter().enumerate() {
        values.insert(column.name().to_string(), decode_scalar(row, index)?);
    }
    Ok(values)
}

/// Decodes one column into a [`SqlScalar`], keeping the native integer width
/// and normalizing everything byte-like to text. Session user variables come
/// back as LONGLONG, DOUBLE, NEWDECIMAL or binary VAR_STRING, all covered
/// here.
fn decode_scalar(row: &MySqlRow, index: usize) -> Result<SqlScalar> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(SqlScalar::Null);
    }
    let type_name = raw.type_info().name().to_string();

    let scalar = if is_integer_type(&type_name) {
        if type_name.contains("UNSIGNED") {
            SqlScalar::UInt(row.try_get_unchecked(index)?)
        } else {
            SqlScalar::Int(row.try_get_unchecked(index)?)
        }
    } else if matches!(type_name.as_str(), "FLOAT" | "DOUBLE") {
        SqlScalar::Float(row.try_get_unchecked(index)?)
    } else if type_name == "DATE" {
        let value: chrono::NaiveDate = row.try_get_unchecked(index)?;
        SqlScalar::Text(value.to_string())
    } else if matches!(type_name.as_str(), "DATETIME" | "TIMESTAMP") {
        let value: chrono::NaiveDateTime = row.try_get_unchecked(index)?;
        SqlScalar::Text(value.format("%Y-%m-%d %H:%M:%S%.f").to_string())
    } else if type_name == "TIME" {
        let value: chrono::NaiveTime = row.try_get_unchecked(index)?;
        SqlScalar::Text(value.to_string())
    } else {
        let bytes: Vec<u8> = row.try_get_unchecked(index)?;
        SqlScalar::Text(String::from_utf8_lossy(&bytes).into_owned())
    };
    Ok(scalar)
}

fn is_integer_type(type_name: &str) -> bool {
    ["TINYINT", "SMALLINT", "MEDIUMINT", "INT", "BIGINT", "BOOLEAN", "YEAR"]
        .iter()
        .any(|family| {
            type_name == *family || type_name.strip_suffix(" UNSIGNED") == Some(family)
        })
}

#[cfg(test)]
mod tests {
    use super::is_integer_type;

    #[test]
    fn integer_family_covers_unsigned_variants() {
        assert!(is_integer_type("BIGINT"));
        assert!(is_integer_type("INT UNSIGNED"));
        assert!(is_integer_type("YEAR"));
        assert!(!is_integer_type("VARCHAR"));
        assert!(!is_integer_type("DECIMAL"));
        assert!(!is_integer_type("POINT"));
    }
}
