// 主机密钥管理
// 首次启动生成 RSA 主机密钥，之后每次从磁盘原样加载

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use rand_core::OsRng;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use russh::keys::PrivateKey;

use crate::constants::host_key::{DEFAULT_FILE_NAME, RSA_BITS};
use crate::ssh::HoneypotError;

/// 确保数据目录下存在默认主机密钥，返回其路径
///
/// 文件已存在时直接返回，不校验内容；否则生成 RSA-3072 密钥，
/// 以 PKCS#8 PEM 格式写入，权限仅属主可读写。
pub fn ensure_default_key(data_dir: &Path) -> Result<PathBuf, HoneypotError> {
    let key_file = data_dir.join(DEFAULT_FILE_NAME);
    match fs::metadata(&key_file) {
        Ok(_) => return Ok(key_file),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(HoneypotError::KeyGeneration {
                path: key_file,
                reason: e.to_string(),
            })
        }
    }

    let generation_error = |reason: String| HoneypotError::KeyGeneration {
        path: key_file.clone(),
        reason,
    };

    tracing::info!("Host key {:?} not found, generating it", key_file);

    fs::create_dir_all(data_dir)
        .map_err(|e| generation_error(format!("failed to create directory: {}", e)))?;

    let key = RsaPrivateKey::new(&mut OsRng, RSA_BITS)
        .map_err(|e| generation_error(format!("failed to generate key: {}", e)))?;
    let pem = key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| generation_error(format!("failed to encode key: {}", e)))?;

    write_private_file(&key_file, pem.as_bytes())
        .map_err(|e| generation_error(format!("failed to write key: {}", e)))?;

    Ok(key_file)
}

/// 新建文件并写入，unix 下权限为 0600
fn write_private_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

/// 加载私钥文件（OpenSSH / PKCS#8 / PKCS#1 PEM）
pub fn load_key(path: &Path) -> Result<PrivateKey, HoneypotError> {
    let parse_error = |reason: String| HoneypotError::KeyParse {
        path: path.to_path_buf(),
        reason,
    };

    let key_data =
        fs::read(path).map_err(|e| parse_error(format!("failed to read key file: {}", e)))?;

    russh::keys::decode_secret_key(&String::from_utf8_lossy(&key_data), None)
        .map_err(|e| parse_error(e.to_string()))
}

/// 按顺序加载全部主机密钥
///
/// 任一失败立即返回错误，不会返回部分结果。
pub fn resolve_host_keys<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<PrivateKey>, HoneypotError> {
    paths
        .iter()
        .map(|path| -> Result<PrivateKey, HoneypotError> {
            let key = load_key(path.as_ref())?;
            tracing::debug!(
                "Loaded host key {:?} ({})",
                path.as_ref(),
                key.algorithm().as_str()
            );
            Ok(key)
        })
        .collect()
}
