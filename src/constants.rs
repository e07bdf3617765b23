// 全局常量

/// 配置默认值
pub mod defaults {
    pub const LISTEN_ADDRESS: &str = "127.0.0.1:2222";
    pub const SERVER_VERSION: &str = "SSH-2.0-sshhoney";
    pub const BANNER: &str = "This is an SSH honeypot. Everything is logged and monitored.";
    /// 数据目录名（位于系统数据目录下）
    pub const DATA_DIR_NAME: &str = "sshhoney";
}

/// 主机密钥
pub mod host_key {
    /// 默认主机密钥文件名
    pub const DEFAULT_FILE_NAME: &str = "host_rsa_key";
    pub const RSA_BITS: usize = 3072;
}
