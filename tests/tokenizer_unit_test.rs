use sql_replay::source::{DumpSource, Origin};
use sql_replay::tokenizer::StatementTokenizer;
use std::io::Write;
use tempfile::TempDir;

fn tokenize(sql: &str) -> Vec<String> {
    StatementTokenizer::from_text(sql)
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

fn tokenize_origin(origin: &Origin) -> Vec<String> {
    let source = DumpSource::open(origin).unwrap();
    StatementTokenizer::new(source)
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

const MYSQLDUMP: &str = r#"-- MySQL dump 10.13  Distrib 8.0.36, for Linux (x86_64)
--
-- Host: localhost    Database: shop
-- ------------------------------------------------------

/*!40101 SET @OLD_CHARACTER_SET_CLIENT=@@CHARACTER_SET_CLIENT */;
/*!40101 SET NAMES utf8mb4 */;
/*!40014 SET @OLD_FOREIGN_KEY_CHECKS=@@FOREIGN_KEY_CHECKS, FOREIGN_KEY_CHECKS=0 */;

--
-- Table structure for table `customers`
--

DROP TABLE IF EXISTS `customers`;
/*!40101 SET @saved_cs_client     = @@character_set_client */;
CREATE TABLE `customers` (
  `id` int NOT NULL AUTO_INCREMENT,
  `name` varchar(255) NOT NULL,
  PRIMARY KEY (`id`)
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
/*!40101 SET character_set_client = @saved_cs_client */;

LOCK TABLES `customers` WRITE;
/*!40000 ALTER TABLE `customers` DISABLE KEYS */;
INSERT INTO `customers` VALUES (1,'Alice'),(2,'Bob');
/*!40000 ALTER TABLE `customers` ENABLE KEYS */;
UNLOCK TABLES;

DELIMITER ;;
CREATE DEFINER=`root`@`localhost` PROCEDURE `touch_customer`(IN cid INT)
BEGIN
  UPDATE customers SET name = name WHERE id = cid;
  SELECT ROW_COUNT();
END ;;
DELIMITER ;

/*!40014 SET FOREIGN_KEY_CHECKS=@OLD_FOREIGN_KEY_CHECKS */;

-- Dump completed on 2024-01-01 12:00:00
"#;

#[test]
fn test_well_formed_statements_counted_in_order() {
    let sql = "CREATE TABLE a (id INT);\nINSERT INTO a VALUES (1);\nINSERT INTO a VALUES (2);\nDROP TABLE a;\n";
    let stmts = tokenize(sql);
    assert_eq!(
        stmts,
        vec![
            "CREATE TABLE a (id INT)",
            "INSERT INTO a VALUES (1)",
            "INSERT INTO a VALUES (2)",
            "DROP TABLE a",
        ]
    );
}

#[test]
fn test_comments_contribute_no_text() {
    let sql = "-- header\nSELECT /* inline */ 1;\n# hash\n/* multi\n   line */\nSELECT 2;";
    let stmts = tokenize(sql);
    assert_eq!(stmts.len(), 2);
    for stmt in &stmts {
        assert!(!stmt.contains("header"));
        assert!(!stmt.contains("inline"));
        assert!(!stmt.contains("hash"));
        assert!(!stmt.contains("multi"));
    }
}

#[test]
fn test_delimiter_switch_yields_three() {
    assert_eq!(
        tokenize("A;\nDELIMITER $$\nB$$\nDELIMITER ;\nC;"),
        vec!["A", "B", "C"]
    );
}

#[test]
fn test_unterminated_final_statement() {
    assert_eq!(tokenize("A;\nB;\nD"), vec!["A", "B", "D"]);
}

#[test]
fn test_only_comments_and_whitespace() {
    assert!(tokenize("\n\n-- a\n#b\n/* c */\n   \n").is_empty());
}

#[test]
fn test_realistic_mysqldump() {
    let stmts = tokenize(MYSQLDUMP);
    assert_eq!(stmts.len(), 6, "statements: {:#?}", stmts);
    assert_eq!(stmts[0], "DROP TABLE IF EXISTS `customers`");
    assert!(stmts[1].starts_with("CREATE TABLE `customers` ("));
    assert!(stmts[1].ends_with("DEFAULT CHARSET=utf8mb4"));
    assert_eq!(stmts[2], "LOCK TABLES `customers` WRITE");
    assert_eq!(stmts[3], "INSERT INTO `customers` VALUES (1,'Alice'),(2,'Bob')");
    assert_eq!(stmts[4], "UNLOCK TABLES");
    assert!(stmts[5].starts_with("CREATE DEFINER=`root`@`localhost` PROCEDURE"));
    assert!(stmts[5].contains("WHERE id = cid;\n  SELECT ROW_COUNT();"));
    assert!(stmts[5].ends_with("END"));
}

#[test]
fn test_local_plain_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("dump.sql");
    std::fs::write(&path, MYSQLDUMP).unwrap();

    let origin = Origin::resolve(&path.to_string_lossy());
    assert!(matches!(origin, Origin::LocalPath { .. }));
    assert_eq!(tokenize_origin(&origin), tokenize(MYSQLDUMP));
}

#[test]
fn test_local_gzip_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("dump.sql.gz");
    let file = std::fs::File::create(&path).unwrap();
    let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    encoder.write_all(MYSQLDUMP.as_bytes()).unwrap();
    encoder.finish().unwrap();

    let origin = Origin::resolve(&path.to_string_lossy());
    assert_eq!(tokenize_origin(&origin), tokenize(MYSQLDUMP));
}

#[test]
fn test_local_zstd_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("dump.sql.zst");
    let compressed = zstd::stream::encode_all(MYSQLDUMP.as_bytes(), 3).unwrap();
    std::fs::write(&path, compressed).unwrap();

    let origin = Origin::resolve(&path.to_string_lossy());
    assert_eq!(tokenize_origin(&origin), tokenize(MYSQLDUMP));
}

#[test]
fn test_inline_text_origin() {
    let origin = Origin::resolve("INSERT INTO t VALUES (1);\nINSERT INTO t VALUES (2);");
    assert!(matches!(origin, Origin::InlineText(_)));
    assert_eq!(tokenize_origin(&origin).len(), 2);
}

#[test]
fn test_tokenizer_restarts_only_by_reconstruction() {
    let sql = "A;\nB;\n";
    let first: Vec<String> = tokenize(sql);
    let second: Vec<String> = tokenize(sql);
    assert_eq!(first, second);

    let mut tokenizer = StatementTokenizer::from_text(sql);
    assert_eq!(tokenizer.by_ref().count(), 2);
    assert!(tokenizer.next().is_none());
}
